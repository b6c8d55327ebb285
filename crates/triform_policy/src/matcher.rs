//! Grant patterns for allow-list entries.
//!
//! An entry is either an exact capability (`fs:read`), a namespace wildcard
//! (`fs:*`) or the global wildcard (`*`).

use serde::{Deserialize, Serialize};
use std::fmt;
use triform_core::Capability;

/// Allow-list parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Entry is neither a capability nor a wildcard
    #[error("invalid allow-list entry '{entry}': {reason}")]
    InvalidPattern {
        /// Entry as written
        entry: String,
        /// What is wrong with it
        reason: String,
    },
}

/// One allow-list entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GrantPattern {
    /// `*`
    Any,
    /// `namespace:*`
    Namespace(String),
    /// Exact capability
    Exact(Capability),
}

impl GrantPattern {
    /// Parse an entry
    ///
    /// # Errors
    ///
    /// Returns error if the entry is not a capability or wildcard
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let entry = raw.trim();
        if entry == "*" {
            return Ok(Self::Any);
        }
        if let Some(namespace) = entry.strip_suffix(":*") {
            // Validate the namespace by parsing a representative capability
            Capability::parse(&format!("{namespace}:any")).map_err(|e| {
                PolicyError::InvalidPattern {
                    entry: entry.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(Self::Namespace(namespace.to_string()));
        }
        Capability::parse(entry)
            .map(Self::Exact)
            .map_err(|e| PolicyError::InvalidPattern {
                entry: entry.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether this entry grants `capability`
    #[must_use]
    pub fn grants(&self, capability: &Capability) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(namespace) => capability.namespace() == namespace.as_str(),
            Self::Exact(exact) => exact == capability,
        }
    }
}

impl fmt::Display for GrantPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Namespace(namespace) => write!(f, "{namespace}:*"),
            Self::Exact(capability) => write!(f, "{capability}"),
        }
    }
}

impl TryFrom<String> for GrantPattern {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GrantPattern> for String {
    fn from(pattern: GrantPattern) -> Self {
        pattern.to_string()
    }
}
