//! The `{ok, result, error, meta}` wire envelope.
//!
//! Exactly one of `result` and `error` is present. Fields are private so the
//! only ways to obtain an [`Envelope`] are the two constructors on
//! [`EnvelopeBuilder`] and deserialization, which rejects payloads that break
//! the exclusivity rule.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Metadata attached to every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Command name
    pub tool: String,
    /// Application version
    pub version: String,
    /// Wall-clock duration of the call
    pub duration_ms: u64,
    /// Caller identity, when detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    /// Session identifier, when the caller supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Set when only the preview path ran
    #[serde(default, skip_serializing_if = "is_false")]
    pub dry_run: bool,
    /// Set when the result was cut to the configured item limit
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Outcome of a single invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ToolError>,
    meta: Meta,
}

impl Envelope {
    /// Whether the call succeeded
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Result value, present iff the call succeeded
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Error, present iff the call failed
    #[must_use]
    pub fn error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }

    /// Envelope metadata
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Process exit code: 0 on success, the category code otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map_or(0, ToolError::exit_code)
    }

    /// Compact single-line JSON
    ///
    /// # Errors
    ///
    /// Returns error if the result value cannot be serialized
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Indented JSON
    ///
    /// # Errors
    ///
    /// Returns error if the result value cannot be serialized
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ToolError>,
    meta: Meta,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        match (raw.ok, raw.result, raw.error) {
            (true, _, Some(_)) => Err("successful envelope must not carry an error".to_string()),
            (false, Some(_), _) => Err("failed envelope must not carry a result".to_string()),
            (false, None, None) => Err("failed envelope must carry an error".to_string()),
            // `"result": null` deserializes to None
            (true, result, None) => Ok(Self {
                ok: true,
                result: Some(result.unwrap_or(Value::Null)),
                error: None,
                meta: raw.meta,
            }),
            (false, None, Some(error)) => Ok(Self {
                ok: false,
                result: None,
                error: Some(error.normalized()),
                meta: raw.meta,
            }),
        }
    }
}

/// Builds envelopes; the only producer of [`Envelope`] values
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    meta: Meta,
}

impl EnvelopeBuilder {
    /// Start an envelope for `tool` at application `version`
    #[must_use]
    pub fn new(tool: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            meta: Meta {
                tool: tool.into(),
                version: version.into(),
                duration_ms: 0,
                caller_id: None,
                session_id: None,
                dry_run: false,
                truncated: false,
            },
        }
    }

    /// Record the call duration
    #[must_use]
    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.meta.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Record the caller identity
    #[must_use]
    pub fn caller_id(mut self, caller_id: Option<String>) -> Self {
        self.meta.caller_id = caller_id;
        self
    }

    /// Record the session identifier
    #[must_use]
    pub fn session_id(mut self, session_id: Option<String>) -> Self {
        self.meta.session_id = session_id;
        self
    }

    /// Mark the envelope as a dry-run preview
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.meta.dry_run = dry_run;
        self
    }

    /// Mark the result as truncated
    #[must_use]
    pub fn truncated(mut self, truncated: bool) -> Self {
        self.meta.truncated = truncated;
        self
    }

    /// Finish with a result
    #[must_use]
    pub fn success(self, result: Value) -> Envelope {
        Envelope {
            ok: true,
            result: Some(result),
            error: None,
            meta: self.meta,
        }
    }

    /// Finish with an error; the retryability clamp is applied here
    #[must_use]
    pub fn failure(self, error: ToolError) -> Envelope {
        Envelope {
            ok: false,
            result: None,
            error: Some(error.normalized()),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, Suggestion};
    use proptest::prelude::*;
    use serde_json::json;

    fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new("find_files", "1.2.0").duration(Duration::from_millis(12))
    }

    #[test]
    fn test_success_wire_shape() {
        let envelope = builder().success(json!(["a.py"]));
        let line = envelope.to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"ok":true,"result":["a.py"],"meta":{"tool":"find_files","version":"1.2.0","duration_ms":12}}"#
        );
        assert_eq!(envelope.exit_code(), 0);
    }

    #[test]
    fn test_failure_wire_shape() {
        let envelope = builder().failure(ToolError::missing_argument("pattern"));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], "E1001");
        assert_eq!(json["error"]["field"], "pattern");
        assert_eq!(envelope.exit_code(), 2);
    }

    #[test]
    fn test_optional_meta_fields() {
        let envelope = builder()
            .caller_id(Some("claude-code".to_string()))
            .session_id(Some("s-1".to_string()))
            .dry_run(true)
            .truncated(true)
            .success(json!(null));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["meta"]["caller_id"], "claude-code");
        assert_eq!(json["meta"]["session_id"], "s-1");
        assert_eq!(json["meta"]["dry_run"], true);
        assert_eq!(json["meta"]["truncated"], true);
    }

    #[test]
    fn test_failure_clamps_retry() {
        let err = ToolError::custom("E5099", ErrorCategory::Internal, "boom")
            .with_retryable(true)
            .with_suggestion(Suggestion::new("retry", "try again"));
        let envelope = builder().failure(err);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["is_retryable"], false);
        assert_eq!(json["error"]["suggestion"]["retry"], false);
    }

    #[test]
    fn test_deserialize_rejects_both() {
        let raw = r#"{"ok":true,"result":1,"error":{"code":"E5001","category":"internal","message":"x","is_retryable":false},"meta":{"tool":"t","version":"1","duration_ms":0}}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_deserialize_rejects_neither() {
        let raw = r#"{"ok":false,"meta":{"tool":"t","version":"1","duration_ms":0}}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_deserialize_null_result() {
        let raw = r#"{"ok":true,"result":null,"meta":{"tool":"t","version":"1","duration_ms":0}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result(), Some(&Value::Null));
    }

    proptest! {
        #[test]
        fn prop_exactly_one_of_result_or_error(ok in any::<bool>(), n in any::<i64>()) {
            let envelope = if ok {
                builder().success(json!(n))
            } else {
                builder().failure(ToolError::execution_failed(n.to_string()))
            };
            let json = serde_json::to_value(&envelope).unwrap();
            prop_assert!(json.get("result").is_some() != json.get("error").is_some());
            prop_assert!(json.get("meta").is_some());
        }
    }
}
