//! triform caller context
//!
//! Works out who is on the other end of an invocation so the runtime can
//! pick a rendering. Detection is a pure function of the process
//! environment, read through a [`ProcessProbe`], and is cached for the
//! lifetime of the process in a [`CallerCache`] owned by the application.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caller;
pub mod detect;
pub mod probe;

pub use caller::{CallerCategory, CallerInfo, Signal};
pub use detect::{CallerCache, CallerDetector};
pub use probe::{ProcessEntry, ProcessProbe, StaticProbe, SystemProbe};
