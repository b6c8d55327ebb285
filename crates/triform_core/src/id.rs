//! Session identifiers.
//!
//! Callers that want to correlate several invocations pass a session id; the
//! id is echoed in `meta.session_id`. Generated ids are UUIDv4 based.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a caller session across invocations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ses_{}", Uuid::new_v4().simple()))
    }

    /// Wrap a caller-supplied id; blank ids are rejected
    #[must_use]
    pub fn from_caller(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// String form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
