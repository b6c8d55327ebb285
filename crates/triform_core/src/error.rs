//! Error taxonomy shared by every surface.
//!
//! A failure crossing the dispatcher boundary is always a [`ToolError`]: a
//! stable [`ErrorCode`], one [`ErrorCategory`] from a closed set, a human
//! message, and optionally the offending field and a single [`Suggestion`].
//!
//! | Category | Exit | Retryable |
//! |----------|------|-----------|
//! | `input` | 2 | may be |
//! | `state` | 10 | may be |
//! | `auth` | 30 | never |
//! | `runtime` | 50 | may be |
//! | `internal` | 70 | never |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for command bodies and core operations
pub type ToolResult<T> = Result<T, ToolError>;

/// Closed set of error categories, ordered by escalation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed, missing or out-of-range argument
    Input,
    /// Precondition not met, e.g. resource not found
    State,
    /// Capability or scope denial
    Auth,
    /// Transient execution failure such as a timeout
    Runtime,
    /// Unexpected failure inside a command body
    Internal,
}

impl ErrorCategory {
    /// All categories in escalation order
    pub const ALL: [ErrorCategory; 5] = [
        Self::Input,
        Self::State,
        Self::Auth,
        Self::Runtime,
        Self::Internal,
    ];

    /// Wire name of the category
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::State => "state",
            Self::Auth => "auth",
            Self::Runtime => "runtime",
            Self::Internal => "internal",
        }
    }

    /// Whether errors of this category may ever be flagged retryable.
    ///
    /// `auth` and `internal` never are, whatever the command author sets.
    #[must_use]
    pub const fn permits_retry(self) -> bool {
        !matches!(self, Self::Auth | Self::Internal)
    }

    /// Process exit code used by the CLI surface
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Input => 2,
            Self::State => 10,
            Self::Auth => 30,
            Self::Runtime => 50,
            Self::Internal => 70,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable short error identifier.
///
/// Known codes map to a default category. Command authors may raise their own
/// codes through [`ErrorCode::Custom`]; those always carry an explicit category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// E1001
    MissingArgument,
    /// E1002
    InvalidType,
    /// E1003
    ConstraintViolation,
    /// E1004
    UnknownArgument,
    /// E1005
    InvalidChoice,
    /// E1006
    DryRunUnsupported,
    /// E1007
    ConfirmationRequired,
    /// E2001
    PermissionDenied,
    /// E2002
    CapabilityDenied,
    /// E3001
    NotFound,
    /// E3002
    PreconditionFailed,
    /// E3003
    Conflict,
    /// `timeout`
    Timeout,
    /// E4001
    ExecutionFailed,
    /// E5001
    Internal,
    /// Author-defined code
    Custom(String),
}

impl ErrorCode {
    /// Wire form of the code
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::MissingArgument => "E1001",
            Self::InvalidType => "E1002",
            Self::ConstraintViolation => "E1003",
            Self::UnknownArgument => "E1004",
            Self::InvalidChoice => "E1005",
            Self::DryRunUnsupported => "E1006",
            Self::ConfirmationRequired => "E1007",
            Self::PermissionDenied => "E2001",
            Self::CapabilityDenied => "E2002",
            Self::NotFound => "E3001",
            Self::PreconditionFailed => "E3002",
            Self::Conflict => "E3003",
            Self::Timeout => "timeout",
            Self::ExecutionFailed => "E4001",
            Self::Internal => "E5001",
            Self::Custom(code) => code,
        }
    }

    /// Parse a wire code, falling back to [`ErrorCode::Custom`]
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "E1001" => Self::MissingArgument,
            "E1002" => Self::InvalidType,
            "E1003" => Self::ConstraintViolation,
            "E1004" => Self::UnknownArgument,
            "E1005" => Self::InvalidChoice,
            "E1006" => Self::DryRunUnsupported,
            "E1007" => Self::ConfirmationRequired,
            "E2001" => Self::PermissionDenied,
            "E2002" => Self::CapabilityDenied,
            "E3001" => Self::NotFound,
            "E3002" => Self::PreconditionFailed,
            "E3003" => Self::Conflict,
            "timeout" => Self::Timeout,
            "E4001" => Self::ExecutionFailed,
            "E5001" => Self::Internal,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Category a known code belongs to
    #[must_use]
    pub fn default_category(&self) -> Option<ErrorCategory> {
        let category = match self {
            Self::MissingArgument
            | Self::InvalidType
            | Self::ConstraintViolation
            | Self::UnknownArgument
            | Self::InvalidChoice
            | Self::DryRunUnsupported
            | Self::ConfirmationRequired => ErrorCategory::Input,
            Self::PermissionDenied | Self::CapabilityDenied => ErrorCategory::Auth,
            Self::NotFound | Self::PreconditionFailed | Self::Conflict => ErrorCategory::State,
            Self::Timeout | Self::ExecutionFailed => ErrorCategory::Runtime,
            Self::Internal => ErrorCategory::Internal,
            Self::Custom(_) => return None,
        };
        Some(category)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        Self::parse(code)
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

/// A single remediation hint attached to a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Short machine tag for the action, e.g. `add_argument`
    pub action: String,
    /// Plain-language fix
    pub fix: String,
    /// Example invocation applying the fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Whether re-invoking after applying the fix is expected to succeed
    pub retry: bool,
}

impl Suggestion {
    /// Create a retryable suggestion
    #[must_use]
    pub fn new(action: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            fix: fix.into(),
            example: None,
            retry: true,
        }
    }

    /// Attach an example
    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Set the retry flag
    #[must_use]
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Substitute `{name}` placeholders in `fix` and `example`
    #[must_use]
    pub fn render(&self, vars: &[(&str, &str)]) -> Self {
        let substitute = |text: &str| {
            vars.iter().fold(text.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        };
        Self {
            action: self.action.clone(),
            fix: substitute(&self.fix),
            example: self.example.as_deref().map(substitute),
            retry: self.retry,
        }
    }
}

/// Structured failure crossing the dispatcher boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ToolError {
    /// Stable short identifier
    pub code: ErrorCode,
    /// Category from the closed taxonomy
    pub category: ErrorCategory,
    /// Human message
    pub message: String,
    /// Offending parameter, when one is to blame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Single remediation hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
    #[serde(rename = "is_retryable")]
    retryable: bool,
}

impl ToolError {
    /// Create an error for a known code, using its default category.
    ///
    /// Custom codes created this way land in `runtime`; prefer
    /// [`ToolError::custom`] for those.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let category = code.default_category().unwrap_or(ErrorCategory::Runtime);
        Self::custom(code, category, message)
    }

    /// Create an error with an explicit category
    #[must_use]
    pub fn custom(
        code: impl Into<ErrorCode>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            category,
            message: message.into(),
            field: None,
            suggestion: None,
            retryable: category.permits_retry(),
        }
    }

    /// Name the offending field
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach a suggestion
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// Request a retryability flag; clamped by [`ToolError::is_retryable`]
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Effective retryability after the category clamp
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable && self.category.permits_retry()
    }

    /// Apply the category clamp to both retry flags.
    ///
    /// `auth` and `internal` errors are never retryable. Only `input` and
    /// `state` errors may keep a suggestion that says retrying will help.
    /// The envelope builder calls this on every failure before it is emitted.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.category.permits_retry() {
            self.retryable = false;
        }
        let hint_may_retry = matches!(self.category, ErrorCategory::Input | ErrorCategory::State);
        if let Some(suggestion) = self.suggestion.as_mut() {
            suggestion.retry &= hint_may_retry;
        }
        self
    }

    /// Exit code for the CLI surface
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// E1001
    #[must_use]
    pub fn missing_argument(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingArgument,
            format!("missing required argument '{field}'"),
        )
        .with_field(field)
    }

    /// E1002
    #[must_use]
    pub fn invalid_type(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidType,
            format!("argument '{field}' must be {expected}"),
        )
        .with_field(field)
    }

    /// E1003
    #[must_use]
    pub fn constraint(field: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConstraintViolation,
            format!("argument '{field}' {reason}"),
        )
        .with_field(field)
    }

    /// E1004
    #[must_use]
    pub fn unknown_argument(field: &str) -> Self {
        Self::new(
            ErrorCode::UnknownArgument,
            format!("unknown argument '{field}'"),
        )
        .with_field(field)
    }

    /// E1005
    #[must_use]
    pub fn invalid_choice(field: &str, choices: &[String]) -> Self {
        Self::new(
            ErrorCode::InvalidChoice,
            format!("argument '{field}' must be one of: {}", choices.join(", ")),
        )
        .with_field(field)
    }

    /// E1006
    #[must_use]
    pub fn dry_run_unsupported(command: &str) -> Self {
        Self::new(
            ErrorCode::DryRunUnsupported,
            format!("command '{command}' does not support dry-run"),
        )
        .with_suggestion(
            Suggestion::new("drop_flag", "run again without --dry-run")
                .with_example(command.to_string()),
        )
    }

    /// E1007
    #[must_use]
    pub fn confirmation_required(command: &str) -> Self {
        Self::new(
            ErrorCode::ConfirmationRequired,
            format!("command '{command}' is destructive and needs confirmation"),
        )
        .with_suggestion(
            Suggestion::new("add_flag", "re-run with --yes, or preview with --dry-run")
                .with_example(format!("{command} --yes")),
        )
    }

    /// E2001
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// E2002
    #[must_use]
    pub fn capability_denied(capability: &str) -> Self {
        Self::new(
            ErrorCode::CapabilityDenied,
            format!("capability '{capability}' is not in the allow-list"),
        )
        .with_suggestion(
            Suggestion::new(
                "grant_capability",
                format!("ask the operator to add '{capability}' to TRIFORM_CAPABILITIES"),
            )
            .with_retry(false),
        )
    }

    /// E3001
    #[must_use]
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{kind} not found: {id}"))
    }

    /// E3002
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, message).with_retryable(false)
    }

    /// E3003
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// `timeout`
    #[must_use]
    pub fn timeout(limit_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("command did not finish within {limit_ms} ms"),
        )
    }

    /// E4001
    #[must_use]
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message)
    }

    /// E5001 with the generic message shown to callers
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            ErrorCode::Internal,
            "internal error while executing the command",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_category_order_is_escalation() {
        assert!(ErrorCategory::Input < ErrorCategory::State);
        assert!(ErrorCategory::State < ErrorCategory::Auth);
        assert!(ErrorCategory::Auth < ErrorCategory::Runtime);
        assert!(ErrorCategory::Runtime < ErrorCategory::Internal);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorCategory::Input.exit_code(), 2);
        assert_eq!(ErrorCategory::State.exit_code(), 10);
        assert_eq!(ErrorCategory::Auth.exit_code(), 30);
        assert_eq!(ErrorCategory::Runtime.exit_code(), 50);
        assert_eq!(ErrorCategory::Internal.exit_code(), 70);
    }

    #[test]
    fn test_error_code_parse() {
        assert_eq!(ErrorCode::parse("E1001"), ErrorCode::MissingArgument);
        assert_eq!(ErrorCode::parse("timeout"), ErrorCode::Timeout);
        assert_eq!(
            ErrorCode::parse("E9000"),
            ErrorCode::Custom("E9000".to_string())
        );
    }

    #[test]
    fn test_missing_argument_wire_shape() {
        let err = ToolError::missing_argument("pattern");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "E1001");
        assert_eq!(json["category"], "input");
        assert_eq!(json["field"], "pattern");
        assert_eq!(json["is_retryable"], true);
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_timeout_is_retryable_runtime() {
        let err = ToolError::timeout(500);
        assert_eq!(err.code.as_str(), "timeout");
        assert_eq!(err.category, ErrorCategory::Runtime);
        assert!(err.is_retryable());
        assert_eq!(err.exit_code(), 50);
    }

    #[test]
    fn test_runtime_hint_never_promises_retry() {
        let err = ToolError::timeout(20)
            .with_suggestion(Suggestion::new("raise_timeout", "pass a longer --timeout"))
            .normalized();
        assert!(err.is_retryable());
        assert!(!err.suggestion.as_ref().unwrap().retry);

        let err = ToolError::execution_failed("disk full")
            .with_suggestion(Suggestion::new("free_space", "free some space").with_retry(true))
            .normalized();
        assert!(!err.suggestion.unwrap().retry);

        let err = ToolError::missing_argument("pattern")
            .with_suggestion(Suggestion::new("add_argument", "pass --pattern"))
            .normalized();
        assert!(err.suggestion.unwrap().retry);
    }

    #[test]
    fn test_auth_is_never_retryable() {
        let err = ToolError::capability_denied("fs:write").with_retryable(true);
        assert!(!err.is_retryable());
        let normalized = err.normalized();
        let json = serde_json::to_value(&normalized).unwrap();
        assert_eq!(json["is_retryable"], false);
        assert_eq!(json["suggestion"]["retry"], false);
    }

    #[test]
    fn test_display() {
        let err = ToolError::not_found("file", "a.txt");
        assert_eq!(err.to_string(), "[E3001] file not found: a.txt");
    }

    #[test]
    fn test_suggestion_render() {
        let template = Suggestion::new("fix_arg", "pass --{field} to {command}")
            .with_example("{command} --{field} x");
        let rendered = template.render(&[("field", "root"), ("command", "find_files")]);
        assert_eq!(rendered.fix, "pass --root to find_files");
        assert_eq!(rendered.example.as_deref(), Some("find_files --root x"));
    }

    #[test]
    fn test_custom_code_keeps_category() {
        let err = ToolError::custom("QUOTA", ErrorCategory::State, "quota exhausted");
        assert_eq!(err.code, ErrorCode::Custom("QUOTA".to_string()));
        assert_eq!(err.category, ErrorCategory::State);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "QUOTA");
    }

    fn any_category() -> impl Strategy<Value = ErrorCategory> {
        prop::sample::select(ErrorCategory::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_auth_and_internal_never_retryable(
            category in any_category(),
            requested in any::<bool>(),
            suggestion_retry in any::<bool>(),
        ) {
            let err = ToolError::custom("X1", category, "boom")
                .with_retryable(requested)
                .with_suggestion(Suggestion::new("a", "b").with_retry(suggestion_retry))
                .normalized();
            if !category.permits_retry() {
                prop_assert!(!err.is_retryable());
            } else {
                prop_assert_eq!(err.is_retryable(), requested);
            }
            let hint_retry = err.suggestion.as_ref().map(|s| s.retry).unwrap_or(false);
            match category {
                ErrorCategory::Input | ErrorCategory::State => {
                    prop_assert_eq!(hint_retry, suggestion_retry);
                }
                _ => prop_assert!(!hint_retry),
            }
        }
    }
}
