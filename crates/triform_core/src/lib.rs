//! triform core types
//!
//! Pure types with no I/O: the error taxonomy, the wire envelope,
//! capabilities, versions and fingerprints. Everything here serializes to a
//! stable, diffable JSON form.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod version;

// Re-exports
pub use capability::{Capability, CapabilityError, CapabilitySet};
pub use envelope::{Envelope, EnvelopeBuilder, Meta};
pub use error::{ErrorCategory, ErrorCode, Suggestion, ToolError, ToolResult};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use id::SessionId;
pub use version::{Version, VersionError};

/// Environment variable carrying an explicit caller identity
pub const ENV_CALLER: &str = "TRIFORM_CALLER";
/// Environment variable carrying the capability allow-list
pub const ENV_CAPABILITIES: &str = "TRIFORM_CAPABILITIES";
/// Environment variable carrying the output format override
pub const ENV_FORMAT: &str = "TRIFORM_FORMAT";
/// Prefix shared by every environment input
pub const ENV_PREFIX: &str = "TRIFORM_";
