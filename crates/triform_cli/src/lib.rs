//! triform CLI surface
//!
//! Wraps a [`triform_tool::CommandRegistry`] in a command-line program:
//!
//! ```text
//! <app> <command> [args...] [--json|--jsonl|--plain] [--dry-run] [--schema]
//!                           [--timeout SECONDS] [--yes] [--help] [--config PATH]
//! ```
//!
//! | Exit | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 2 | input or validation error |
//! | 10 | not found or state error |
//! | 30 | capability or permission denied |
//! | 50 | timeout or runtime failure |
//! | 70 | internal error |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod flags;
pub mod logging;

pub use app::{App, AppOutput, help_table};
pub use flags::{GlobalFlags, SplitArgs, split_args};
pub use logging::{ENV_LOG, ENV_LOG_FORMAT, init_logging};
