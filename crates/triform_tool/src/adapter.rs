//! Input adapters: raw call input to a typed argument map.
//!
//! The dispatcher pipeline is the same for every surface; only this step
//! differs. CLI tokens go through [`parse_tokens`], in-process keyword calls
//! through [`parse_keywords`]. Both finish by filling defaults and reporting
//! the first missing required parameter in declaration order.

use crate::schema::{ParameterSpec, TypeSpec};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use triform_core::{ErrorCode, ToolError};

/// Token-level parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// `--name` given with no value following it
    #[error("flag '{flag}' expects a value")]
    MissingValue {
        /// Parameter name
        param: String,
        /// Flag as typed
        flag: String,
    },
    /// Flag that matches no parameter
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),
    /// Positional token with no required parameter left to fill
    #[error("unexpected positional argument '{0}'")]
    UnexpectedPositional(String),
    /// Token that does not convert to the parameter type
    #[error("argument '{param}' must be {expected}, got '{raw}'")]
    Unparseable {
        /// Parameter name
        param: String,
        /// Human type description
        expected: String,
        /// Token as typed
        raw: String,
    },
}

impl From<AdapterError> for ToolError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err {
            AdapterError::MissingValue { param, .. } | AdapterError::Unparseable { param, .. } => {
                ToolError::new(ErrorCode::InvalidType, message).with_field(param)
            }
            AdapterError::UnknownFlag(flag) => {
                let field = flag.trim_start_matches('-').replace('-', "_");
                ToolError::new(ErrorCode::UnknownArgument, message).with_field(field)
            }
            AdapterError::UnexpectedPositional(_) => {
                ToolError::new(ErrorCode::UnknownArgument, message)
            }
        }
    }
}

/// Raw input as it arrives from a surface
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    /// CLI tokens after the command name, global flags already removed
    Tokens(Vec<String>),
    /// Keyword arguments from a structured or in-process call
    Keywords(Map<String, Value>),
}

impl RawInput {
    /// Tokens from anything string-like
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    /// Keywords from a JSON value; anything but an object is rejected
    ///
    /// # Errors
    ///
    /// E1002 if `value` is not an object
    pub fn from_json(value: Value) -> Result<Self, ToolError> {
        match value {
            Value::Object(map) => Ok(Self::Keywords(map)),
            Value::Null => Ok(Self::Keywords(Map::new())),
            _ => Err(ToolError::new(
                ErrorCode::InvalidType,
                "call arguments must be a JSON object",
            )),
        }
    }

    /// Run the matching adapter
    ///
    /// # Errors
    ///
    /// Returns an `input` error for unknown, unparseable or missing arguments
    pub fn adapt(&self, params: &[ParameterSpec]) -> Result<IndexMap<String, Value>, ToolError> {
        match self {
            Self::Tokens(tokens) => parse_tokens(params, tokens),
            Self::Keywords(map) => parse_keywords(params, map),
        }
    }
}

/// Token-stream adapter.
///
/// Accepts `--name value`, `--name=value`, `--flag` / `--no-flag` for
/// booleans, repeated flags for arrays, and positionals that fill required
/// parameters in declaration order. Everything after `--` is positional.
///
/// # Errors
///
/// Returns the first token-level failure, then the first missing parameter
pub fn parse_tokens(
    params: &[ParameterSpec],
    tokens: &[String],
) -> Result<IndexMap<String, Value>, ToolError> {
    let mut args: IndexMap<String, Value> = IndexMap::new();
    let mut positionals = Vec::new();
    let mut iter = tokens.iter();
    let mut only_positional = false;

    while let Some(token) = iter.next() {
        if only_positional || token == "-" || !token.starts_with("--") {
            positionals.push(token.clone());
            continue;
        }
        if token == "--" {
            only_positional = true;
            continue;
        }

        let body = &token[2..];
        let (flag, inline) = match body.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (body, None),
        };
        let key = flag.replace('-', "_");

        if let Some(param) = params.iter().find(|p| p.name == key) {
            let raw = if param.ty.is_boolean() && inline.is_none() {
                None
            } else {
                match inline {
                    Some(value) => Some(value),
                    None => Some(iter.next().cloned().ok_or_else(|| {
                        AdapterError::MissingValue {
                            param: param.name.clone(),
                            flag: token.clone(),
                        }
                    })?),
                }
            };
            let value = match raw {
                None => Value::Bool(true),
                Some(raw) => convert(param, &param.ty, &raw)?,
            };
            store(&mut args, param, value);
            continue;
        }

        let negated = key
            .strip_prefix("no_")
            .and_then(|name| params.iter().find(|p| p.name == name && p.ty.is_boolean()));
        match (negated, inline) {
            (Some(param), None) => store(&mut args, param, Value::Bool(false)),
            _ => return Err(AdapterError::UnknownFlag(token.clone()).into()),
        }
    }

    for raw in positionals {
        let slot = params
            .iter()
            .find(|p| p.required && !args.contains_key(&p.name))
            .ok_or_else(|| AdapterError::UnexpectedPositional(raw.clone()))?;
        let value = convert(slot, &slot.ty, &raw)?;
        store(&mut args, slot, value);
    }

    finish(params, args)
}

/// Direct keyword adapter for structured and in-process calls
///
/// # Errors
///
/// E1004 for the first unknown key, then E1001 for the first missing parameter
pub fn parse_keywords(
    params: &[ParameterSpec],
    input: &Map<String, Value>,
) -> Result<IndexMap<String, Value>, ToolError> {
    if let Some(unknown) = input.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
        return Err(ToolError::unknown_argument(unknown));
    }
    let args = params
        .iter()
        .filter_map(|p| input.get(&p.name).map(|v| (p.name.clone(), v.clone())))
        .collect();
    finish(params, args)
}

/// Fill defaults and check required parameters; output is in declaration order
fn finish(
    params: &[ParameterSpec],
    mut args: IndexMap<String, Value>,
) -> Result<IndexMap<String, Value>, ToolError> {
    let mut out = IndexMap::with_capacity(params.len());
    for param in params {
        match args.swap_remove(&param.name) {
            Some(value) if !value.is_null() || param.ty.is_optional() => {
                out.insert(param.name.clone(), value);
            }
            _ => {
                if let Some(default) = &param.default {
                    out.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(ToolError::missing_argument(&param.name));
                } else if param.ty.is_optional() {
                    out.insert(param.name.clone(), Value::Null);
                }
            }
        }
    }
    Ok(out)
}

fn store(args: &mut IndexMap<String, Value>, param: &ParameterSpec, value: Value) {
    if matches!(param.ty.unwrapped(), TypeSpec::Array { .. }) {
        let items = args
            .entry(param.name.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        match (items, value) {
            (Value::Array(items), Value::Array(more)) => items.extend(more),
            (Value::Array(items), single) => items.push(single),
            (slot, value) => *slot = value,
        }
    } else {
        args.insert(param.name.clone(), value);
    }
}

fn convert(param: &ParameterSpec, ty: &TypeSpec, raw: &str) -> Result<Value, AdapterError> {
    let fail = || AdapterError::Unparseable {
        param: param.name.clone(),
        expected: ty.describe(),
        raw: raw.to_string(),
    };
    match ty {
        TypeSpec::String | TypeSpec::Enum { .. } => Ok(Value::String(raw.to_string())),
        TypeSpec::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| fail()),
        TypeSpec::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(fail),
        TypeSpec::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "no" | "0" | "off" => Ok(Value::Bool(false)),
            _ => Err(fail()),
        },
        TypeSpec::Optional { inner } => {
            if raw == "null" {
                Ok(Value::Null)
            } else {
                convert(param, inner, raw)
            }
        }
        TypeSpec::Array { items } => {
            // A JSON array literal sets the whole list, anything else is one item
            if raw.trim_start().starts_with('[') {
                if let Ok(Value::Array(list)) = serde_json::from_str::<Value>(raw) {
                    return Ok(Value::Array(list));
                }
            }
            convert(param, items, raw)
        }
        TypeSpec::Object { .. } => match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Ok(value),
            _ => Err(fail()),
        },
        TypeSpec::Any => {
            Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn find_files() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("pattern", TypeSpec::String),
            ParameterSpec::optional("root", TypeSpec::String, Some(json!("."))),
            ParameterSpec::optional("max_depth", TypeSpec::optional(TypeSpec::Integer), None),
            ParameterSpec::optional("hidden", TypeSpec::Boolean, Some(json!(false))),
            ParameterSpec::optional("exclude", TypeSpec::array(TypeSpec::String), Some(json!([]))),
        ]
    }

    fn toks(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_tokens_flags_and_defaults() {
        let args = parse_tokens(
            &find_files(),
            &toks(&["--pattern", "*.rs", "--max-depth=2", "--hidden"]),
        )
        .unwrap();
        assert_eq!(args["pattern"], "*.rs");
        assert_eq!(args["root"], ".");
        assert_eq!(args["max_depth"], 2);
        assert_eq!(args["hidden"], true);
        let names: Vec<&str> = args.keys().map(String::as_str).collect();
        assert_eq!(names, ["pattern", "root", "max_depth", "hidden", "exclude"]);
    }

    #[test]
    fn test_tokens_positional_and_negation() {
        let args = parse_tokens(&find_files(), &toks(&["*.py", "--no-hidden"])).unwrap();
        assert_eq!(args["pattern"], "*.py");
        assert_eq!(args["hidden"], false);
        assert_eq!(args["max_depth"], Value::Null);
    }

    #[test]
    fn test_tokens_repeated_array_flag() {
        let args = parse_tokens(
            &find_files(),
            &toks(&["x", "--exclude", "target", "--exclude", ".git"]),
        )
        .unwrap();
        assert_eq!(args["exclude"], json!(["target", ".git"]));
    }

    #[test]
    fn test_tokens_missing_required() {
        let err = parse_tokens(&find_files(), &toks(&["--root", "/tmp"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
        assert_eq!(err.field.as_deref(), Some("pattern"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_tokens_errors() {
        let err = parse_tokens(&find_files(), &toks(&["x", "--depth", "1"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownArgument);
        assert_eq!(err.field.as_deref(), Some("depth"));

        let err = parse_tokens(&find_files(), &toks(&["x", "--max-depth", "deep"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
        assert_eq!(err.field.as_deref(), Some("max_depth"));

        let err = parse_tokens(&find_files(), &toks(&["x", "--root"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);

        let err = parse_tokens(&find_files(), &toks(&["x", "y"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownArgument);
    }

    #[test]
    fn test_double_dash_makes_positional() {
        let args = parse_tokens(&find_files(), &toks(&["--", "--weird"])).unwrap();
        assert_eq!(args["pattern"], "--weird");
    }

    #[test]
    fn test_keywords() {
        let input = json!({"pattern": "*.md", "max_depth": null});
        let RawInput::Keywords(map) = RawInput::from_json(input).unwrap() else {
            panic!("expected keywords");
        };
        let args = parse_keywords(&find_files(), &map).unwrap();
        assert_eq!(args["pattern"], "*.md");
        assert_eq!(args["max_depth"], Value::Null);
        assert_eq!(args["root"], ".");
    }

    #[test]
    fn test_keywords_unknown_and_null_required() {
        let mut map = Map::new();
        map.insert("pattern".to_string(), json!("a"));
        map.insert("colour".to_string(), json!("red"));
        let err = parse_keywords(&find_files(), &map).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownArgument);
        assert_eq!(err.field.as_deref(), Some("colour"));

        let mut map = Map::new();
        map.insert("pattern".to_string(), Value::Null);
        let err = parse_keywords(&find_files(), &map).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(RawInput::from_json(json!([1])).is_err());
        assert_eq!(
            RawInput::from_json(Value::Null).unwrap(),
            RawInput::Keywords(Map::new())
        );
    }
}
