//! Allow-list and the authorize decision.

use crate::matcher::{GrantPattern, PolicyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use triform_core::{Capability, CapabilitySet, ToolError};

/// Runtime allow-list of granted capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    grants: Vec<GrantPattern>,
}

impl AllowList {
    /// Allow-list granting nothing
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma separated list such as `fs:read,net:*`.
    ///
    /// Blank entries are skipped, so an empty string yields an allow-list that
    /// grants nothing (which is not the same as no allow-list at all).
    ///
    /// # Errors
    ///
    /// Returns the first invalid entry
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(GrantPattern::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(|grants| Self { grants })
    }

    /// Build from already parsed entries
    #[must_use]
    pub fn from_patterns(grants: Vec<GrantPattern>) -> Self {
        Self { grants }
    }

    /// Add a grant
    #[must_use]
    pub fn grant(mut self, pattern: GrantPattern) -> Self {
        self.grants.push(pattern);
        self
    }

    /// Whether any entry grants `capability`; `none` is always granted
    #[must_use]
    pub fn permits(&self, capability: &Capability) -> bool {
        capability.is_none() || self.grants.iter().any(|g| g.grants(capability))
    }

    /// Entries in the order given
    pub fn iter(&self) -> impl Iterator<Item = &GrantPattern> {
        self.grants.iter()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the list grants nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, grant) in self.grants.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{grant}")?;
        }
        Ok(())
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Every declared capability is granted
    Allow,
    /// First declared capability that is not granted
    Deny {
        /// The missing capability
        missing: Capability,
    },
}

impl Decision {
    /// Check if allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Convert to a result; a denial becomes E2002
    ///
    /// # Errors
    ///
    /// Returns the auth error naming the missing capability
    pub fn into_result(self) -> Result<(), ToolError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { missing } => Err(ToolError::capability_denied(missing.as_str())),
        }
    }
}

/// Decide whether a command may run.
///
/// With no allow-list the policy is disabled and everything is allowed.
/// Otherwise the first declared capability (in declaration order) that the
/// allow-list does not grant is reported.
#[must_use]
pub fn authorize(required: &CapabilitySet, allow: Option<&AllowList>) -> Decision {
    let Some(allow) = allow else {
        return Decision::Allow;
    };
    match required.required().find(|cap| !allow.permits(cap)) {
        Some(missing) => {
            tracing::debug!(capability = %missing, allow_list = %allow, "capability denied");
            Decision::Deny {
                missing: missing.clone(),
            }
        }
        None => Decision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use triform_core::{ErrorCategory, ErrorCode};

    fn caps(raw: &[&str]) -> CapabilitySet {
        CapabilitySet::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_allow_list() {
        let allow = AllowList::parse("fs:read, net:* ,,").unwrap();
        assert_eq!(allow.len(), 2);
        assert_eq!(allow.to_string(), "fs:read,net:*");
        assert!(AllowList::parse("").unwrap().is_empty());
        assert!(AllowList::parse("fs:read,bogus").is_err());
    }

    #[test]
    fn test_disabled_policy_allows() {
        assert_eq!(authorize(&caps(&["fs:write"]), None), Decision::Allow);
    }

    #[test]
    fn test_missing_write_is_denied() {
        let allow = AllowList::parse("fs:read").unwrap();
        let decision = authorize(&caps(&["fs:write"]), Some(&allow));
        assert!(!decision.is_allowed());

        let err = decision.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::CapabilityDenied);
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
        assert_eq!(err.exit_code(), 30);
        assert!(err.message.contains("fs:write"));
    }

    #[test]
    fn test_first_missing_in_declaration_order() {
        let allow = AllowList::parse("fs:read").unwrap();
        let decision = authorize(&caps(&["fs:read", "net:write", "fs:write"]), Some(&allow));
        assert_eq!(
            decision,
            Decision::Deny {
                missing: Capability::parse("net:write").unwrap()
            }
        );
    }

    #[test]
    fn test_none_needs_no_grant() {
        let allow = AllowList::empty();
        assert!(authorize(&caps(&["none"]), Some(&allow)).is_allowed());
        assert!(authorize(&CapabilitySet::new(), Some(&allow)).is_allowed());
    }

    #[test]
    fn test_wildcards() {
        let allow = AllowList::parse("fs:*").unwrap();
        assert!(authorize(&caps(&["fs:read", "fs:write"]), Some(&allow)).is_allowed());
        let allow = AllowList::parse("*").unwrap();
        assert!(authorize(&caps(&["net:write"]), Some(&allow)).is_allowed());
    }

    #[test]
    fn test_serde_as_string_list() {
        let allow = AllowList::parse("fs:read,net:*").unwrap();
        let json = serde_json::to_string(&allow).unwrap();
        assert_eq!(json, r#"["fs:read","net:*"]"#);
        let back: AllowList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, allow);
    }

    proptest! {
        #[test]
        fn prop_denial_names_a_declared_ungranted_capability(
            declared in proptest::collection::vec("[a-c]:[a-c]", 0..6),
            granted in proptest::collection::vec("[a-c]:[a-c]", 0..6),
        ) {
            let required = CapabilitySet::parse(&declared).unwrap();
            let allow = AllowList::parse(&granted.join(",")).unwrap();
            match authorize(&required, Some(&allow)) {
                Decision::Allow => {
                    prop_assert!(required.iter().all(|c| allow.permits(c)));
                }
                Decision::Deny { missing } => {
                    prop_assert!(required.has(&missing));
                    prop_assert!(!allow.permits(&missing));
                    let first = required.iter().find(|c| !allow.permits(c)).cloned();
                    prop_assert_eq!(Some(missing), first);
                }
            }
        }
    }
}
