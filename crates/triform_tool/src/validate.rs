//! Validation of command declarations and call arguments.
//!
//! Declaration checks run once at registration and fail fast. Argument checks
//! run on every call, in parameter declaration order, and stop at the first
//! failing field so the error names exactly one parameter.

use crate::schema::{ParameterSpec, TypeSpec};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use triform_core::ToolError;

/// Declaration problem found at registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// Command name breaks the naming convention
    #[error("invalid command name '{0}'")]
    InvalidName(String),
    /// Parameter name breaks the naming convention
    #[error("invalid parameter name '{0}'")]
    InvalidParameterName(String),
    /// Constraint does not fit the declared type
    #[error("parameter '{param}': {reason}")]
    Constraint {
        /// Parameter name
        param: String,
        /// What is wrong
        reason: String,
    },
    /// Pattern is not a valid regex
    #[error("parameter '{param}': invalid pattern: {reason}")]
    Pattern {
        /// Parameter name
        param: String,
        /// Regex compile error
        reason: String,
    },
    /// Default value does not satisfy the declared type or constraints
    #[error("parameter '{param}': default {reason}")]
    Default {
        /// Parameter name
        param: String,
        /// Validation message
        reason: String,
    },
}

/// Validate a command name.
///
/// Names are lowercase ASCII letters, digits, `_` or `-`; they must start
/// with a letter and must not end with a separator or repeat one.
///
/// # Errors
///
/// Returns error if the name breaks the convention
pub fn validate_command_name(name: &str) -> Result<(), DeclarationError> {
    let invalid = || DeclarationError::InvalidName(name.to_string());
    let first = name.chars().next().ok_or_else(invalid)?;
    if !first.is_ascii_lowercase() {
        return Err(invalid());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(invalid());
    }
    if name.ends_with(['_', '-']) || name.contains("__") || name.contains("--") {
        return Err(invalid());
    }
    Ok(())
}

/// Validate a parameter name (snake_case identifier)
///
/// # Errors
///
/// Returns error if the name is not a snake_case identifier
pub fn validate_parameter_name(name: &str) -> Result<(), DeclarationError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_');
    if valid {
        Ok(())
    } else {
        Err(DeclarationError::InvalidParameterName(name.to_string()))
    }
}

/// Check that `value` conforms to `ty`.
///
/// `field` names the parameter (dotted for nested object fields) and ends up
/// in `ToolError::field`.
///
/// # Errors
///
/// E1002 for type mismatches, E1005 for enum violations, E1001/E1004 for
/// missing or unknown nested object fields
pub fn check_value(ty: &TypeSpec, field: &str, value: &Value) -> Result<(), ToolError> {
    match ty {
        TypeSpec::Any => Ok(()),
        TypeSpec::Optional { inner } => {
            if value.is_null() {
                Ok(())
            } else {
                check_value(inner, field, value)
            }
        }
        TypeSpec::String => expect(value.is_string(), ty, field),
        TypeSpec::Integer => expect(value.is_i64() || value.is_u64(), ty, field),
        TypeSpec::Float => expect(value.is_number(), ty, field),
        TypeSpec::Boolean => expect(value.is_boolean(), ty, field),
        TypeSpec::Enum { values } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => Ok(()),
            _ => Err(ToolError::invalid_choice(field, values)),
        },
        TypeSpec::Array { items } => {
            let array = value
                .as_array()
                .ok_or_else(|| ToolError::invalid_type(field, &ty.describe()))?;
            for item in array {
                check_value(items, field, item)?;
            }
            Ok(())
        }
        TypeSpec::Object { fields } => {
            let object = value
                .as_object()
                .ok_or_else(|| ToolError::invalid_type(field, &ty.describe()))?;
            if fields.is_empty() {
                return Ok(());
            }
            if let Some(unknown) = object.keys().find(|k| !fields.iter().any(|f| &f.name == *k)) {
                return Err(ToolError::unknown_argument(&format!("{field}.{unknown}")));
            }
            for spec in fields {
                let path = format!("{field}.{}", spec.name);
                match object.get(&spec.name) {
                    Some(v) if !v.is_null() || spec.ty.is_optional() => {
                        check_value(&spec.ty, &path, v)?;
                    }
                    _ if spec.required => return Err(ToolError::missing_argument(&path)),
                    _ => {}
                }
            }
            Ok(())
        }
    }
}

fn expect(ok: bool, ty: &TypeSpec, field: &str) -> Result<(), ToolError> {
    if ok {
        Ok(())
    } else {
        Err(ToolError::invalid_type(field, &ty.describe()))
    }
}

/// Per-command argument validator with precompiled patterns
#[derive(Debug, Clone, Default)]
pub struct ArgumentValidator {
    patterns: IndexMap<String, Regex>,
}

impl ArgumentValidator {
    /// Check parameter declarations and compile their patterns.
    ///
    /// # Errors
    ///
    /// Returns the first declaration problem
    pub fn compile(params: &[ParameterSpec]) -> Result<Self, DeclarationError> {
        let mut patterns = IndexMap::new();
        for param in params {
            validate_parameter_name(&param.name)?;
            param
                .constraints
                .check_applicable(&param.ty)
                .map_err(|reason| DeclarationError::Constraint {
                    param: param.name.clone(),
                    reason,
                })?;
            if let Some(pattern) = &param.constraints.pattern {
                let regex = Regex::new(pattern).map_err(|e| DeclarationError::Pattern {
                    param: param.name.clone(),
                    reason: e.to_string(),
                })?;
                patterns.insert(param.name.clone(), regex);
            }
        }

        let validator = Self { patterns };
        for param in params {
            if let Some(default) = &param.default {
                validator
                    .check_param(param, default)
                    .map_err(|err| DeclarationError::Default {
                        param: param.name.clone(),
                        reason: err.message,
                    })?;
            }
        }
        Ok(validator)
    }

    /// Validate every argument in declaration order
    ///
    /// # Errors
    ///
    /// Returns the error for the first failing parameter
    pub fn validate(
        &self,
        params: &[ParameterSpec],
        args: &IndexMap<String, Value>,
    ) -> Result<(), ToolError> {
        for param in params {
            if let Some(value) = args.get(&param.name) {
                self.check_param(param, value)?;
            }
        }
        Ok(())
    }

    /// Validate a single parameter value against type and constraints
    ///
    /// # Errors
    ///
    /// Returns the type or constraint violation
    pub fn check_param(&self, param: &ParameterSpec, value: &Value) -> Result<(), ToolError> {
        let name = param.name.as_str();
        check_value(&param.ty, name, value)?;
        if value.is_null() {
            return Ok(());
        }

        let constraints = &param.constraints;
        if let Some(n) = value.as_f64() {
            if let Some(min) = constraints.minimum {
                if n < min {
                    return Err(ToolError::constraint(name, format!("must be >= {min}")));
                }
            }
            if let Some(max) = constraints.maximum {
                if n > max {
                    return Err(ToolError::constraint(name, format!("must be <= {max}")));
                }
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min) = constraints.min_length {
                if len < min {
                    return Err(ToolError::constraint(
                        name,
                        format!("must have length >= {min}"),
                    ));
                }
            }
            if let Some(max) = constraints.max_length {
                if len > max {
                    return Err(ToolError::constraint(
                        name,
                        format!("must have length <= {max}"),
                    ));
                }
            }
        }

        if let (Some(regex), Some(s)) = (self.patterns.get(name), value.as_str()) {
            if !regex.is_match(s) {
                return Err(ToolError::constraint(
                    name,
                    format!("must match pattern {}", regex.as_str()),
                ));
            }
        }
        Ok(())
    }
}
