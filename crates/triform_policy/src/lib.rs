//! triform capability policy
//!
//! Decides, before a command body runs, whether every capability it declares
//! is granted by the runtime allow-list. A missing allow-list disables the
//! policy entirely.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decision;
pub mod matcher;

pub use decision::{AllowList, Decision, authorize};
pub use matcher::{GrantPattern, PolicyError};
