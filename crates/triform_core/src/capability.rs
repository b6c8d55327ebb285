//! Capability types for side-effect gating.
//!
//! A capability is a `namespace:action` scope such as `fs:read` or
//! `net:write`. The special capability `none` declares a command without
//! side effects and is always satisfied.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capability parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Empty capability string
    #[error("capability must not be empty")]
    Empty,
    /// Not of the form `namespace:action`
    #[error("capability '{0}' must look like 'namespace:action'")]
    Malformed(String),
    /// Contains characters outside `[a-z0-9_-]`
    #[error("capability '{0}' may only use lowercase letters, digits, '_' and '-'")]
    InvalidCharacter(String),
}

/// A declared side-effect scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// The capability that needs no grant
    pub const NONE: &'static str = "none";

    /// Parse and validate a capability string
    ///
    /// # Errors
    ///
    /// Returns error if the string is not `none` or `namespace:action`
    pub fn parse(raw: &str) -> Result<Self, CapabilityError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CapabilityError::Empty);
        }
        if raw == Self::NONE {
            return Ok(Self(raw.to_string()));
        }

        let (namespace, action) = raw
            .split_once(':')
            .ok_or_else(|| CapabilityError::Malformed(raw.to_string()))?;
        if namespace.is_empty() || action.is_empty() || action.contains(':') {
            return Err(CapabilityError::Malformed(raw.to_string()));
        }

        let valid = |part: &str| {
            part.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        };
        if !valid(namespace) || !valid(action) {
            return Err(CapabilityError::InvalidCharacter(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    /// The `none` capability
    #[must_use]
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    /// Whether this is the `none` capability
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    /// Namespace part, e.g. `fs` for `fs:read`
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(ns, _)| ns)
    }

    /// Action part, e.g. `read` for `fs:read`
    #[must_use]
    pub fn action(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, action)| action)
    }

    /// String form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Capability {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.0
    }
}

/// Capabilities declared by a command, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: IndexSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of capability strings, keeping the first occurrence of duplicates
    ///
    /// # Errors
    ///
    /// Returns the first invalid capability
    pub fn parse<I, S>(raw: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in raw {
            set.declare(Capability::parse(item.as_ref())?);
        }
        Ok(set)
    }

    /// Declare a capability
    pub fn declare(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Check if a specific capability is declared
    #[must_use]
    pub fn has(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Capabilities that actually need a grant (everything except `none`)
    pub fn required(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter().filter(|cap| !cap.is_none())
    }

    /// Get the number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Iterate over capabilities in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}
