//! triform runtime
//!
//! Runs registered commands for any surface. Every invocation, whether it
//! arrives as CLI tokens, an in-process call or a wire tool call, goes
//! through the same [`Dispatcher`] pipeline and ends in exactly one
//! [`triform_core::Envelope`].
//!
//! ```no_run
//! # async fn demo(registry: std::sync::Arc<triform_tool::CommandRegistry>) {
//! use triform_runtime::{CallOptions, Dispatcher};
//!
//! let dispatcher = Dispatcher::new(registry);
//! let outcome = dispatcher
//!     .call("find_files", serde_json::json!({"pattern": "*.rs"}), CallOptions::new())
//!     .await;
//! print!("{}", outcome.render().stdout);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod router;

pub use config::{ConfigError, RuntimeConfig};
pub use context::{CallOptions, ExecutionContext};
pub use dispatcher::{Dispatcher, Outcome};
pub use router::{OutputFormat, RenderedOutput, choose_format, route};
