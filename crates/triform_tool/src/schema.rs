//! Type mapper: declared parameter types and their portable schema form.
//!
//! A [`TypeSpec`] is declared explicitly at registration, either with the
//! constructors or from a compact type expression:
//!
//! ```text
//! string | int | float | bool | object | any
//! list[T]  optional[T]  T?  enum[a|b|c]
//! ```
//!
//! [`TypeSpec::to_schema`] is pure: the same spec always produces the same
//! JSON value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

/// Type declaration error, raised at registration time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// Type name not known to the mapper
    #[error("unsupported type '{0}'")]
    Unsupported(String),
    /// Expression could not be parsed
    #[error("malformed type expression '{0}'")]
    Malformed(String),
    /// Enum with no values
    #[error("enum must declare at least one value")]
    EmptyEnum,
    /// Enum value declared twice
    #[error("enum value '{0}' declared twice")]
    DuplicateEnumValue(String),
    /// `optional[optional[T]]`
    #[error("optional types cannot be nested")]
    NestedOptional,
    /// Object field declared twice
    #[error("object field '{0}' declared twice")]
    DuplicateField(String),
}

/// A field of a structured object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeSpec,
    /// Whether the field must be present
    pub required: bool,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    /// A required field
    #[must_use]
    pub fn required(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
        }
    }

    /// An optional field
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    /// Set the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declared type of a parameter, field or return value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSpec {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// Boolean
    Boolean,
    /// String restricted to a fixed set of values
    Enum {
        /// Allowed values, in declaration order
        values: Vec<String>,
    },
    /// Homogeneous array
    Array {
        /// Item type
        items: Box<TypeSpec>,
    },
    /// Object; no fields means free-form
    Object {
        /// Declared fields
        fields: Vec<FieldSpec>,
    },
    /// Value that may also be null
    Optional {
        /// Wrapped type
        inner: Box<TypeSpec>,
    },
    /// Any JSON value
    Any,
}

impl TypeSpec {
    /// Enum type
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Array type
    #[must_use]
    pub fn array(items: TypeSpec) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    /// Structured object type
    #[must_use]
    pub fn object(fields: Vec<FieldSpec>) -> Self {
        Self::Object { fields }
    }

    /// Optional wrapper
    #[must_use]
    pub fn optional(inner: TypeSpec) -> Self {
        Self::Optional {
            inner: Box::new(inner),
        }
    }

    /// Parse a type expression
    ///
    /// # Errors
    ///
    /// Returns error on unknown names or malformed brackets
    pub fn parse(expr: &str) -> Result<Self, TypeError> {
        let expr = expr.trim();
        if let Some(base) = expr.strip_suffix('?') {
            return Ok(Self::optional(Self::parse(base)?));
        }

        let Some(open) = expr.find('[') else {
            return Self::parse_name(expr);
        };
        let inner = expr[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| TypeError::Malformed(expr.to_string()))?;
        let name = expr[..open].trim().to_ascii_lowercase();

        match name.as_str() {
            "list" | "array" => Ok(Self::array(Self::parse(inner)?)),
            "optional" => Ok(Self::optional(Self::parse(inner)?)),
            "enum" => {
                let values: Vec<String> = inner
                    .split(['|', ','])
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect();
                Ok(Self::Enum { values })
            }
            other => Err(TypeError::Unsupported(other.to_string())),
        }
    }

    fn parse_name(name: &str) -> Result<Self, TypeError> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Integer),
            "float" | "number" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Boolean),
            "object" | "dict" => Ok(Self::object(Vec::new())),
            "any" => Ok(Self::Any),
            "" => Err(TypeError::Malformed(name.to_string())),
            "list" | "array" | "optional" | "enum" => Err(TypeError::Malformed(name.to_string())),
            other => Err(TypeError::Unsupported(other.to_string())),
        }
    }

    /// Check structural rules that a parsed or hand-built spec must satisfy
    ///
    /// # Errors
    ///
    /// Returns the first violated rule
    pub fn check(&self) -> Result<(), TypeError> {
        match self {
            Self::Enum { values } => {
                if values.is_empty() {
                    return Err(TypeError::EmptyEnum);
                }
                let mut seen = BTreeSet::new();
                for value in values {
                    if !seen.insert(value) {
                        return Err(TypeError::DuplicateEnumValue(value.clone()));
                    }
                }
                Ok(())
            }
            Self::Array { items } => items.check(),
            Self::Object { fields } => {
                let mut seen = BTreeSet::new();
                for field in fields {
                    if !seen.insert(&field.name) {
                        return Err(TypeError::DuplicateField(field.name.clone()));
                    }
                    field.ty.check()?;
                }
                Ok(())
            }
            Self::Optional { inner } => {
                if matches!(**inner, Self::Optional { .. }) {
                    return Err(TypeError::NestedOptional);
                }
                inner.check()
            }
            Self::String | Self::Integer | Self::Float | Self::Boolean | Self::Any => Ok(()),
        }
    }

    /// Whether null is an accepted value
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. } | Self::Any)
    }

    /// The type with any optional wrapper removed
    #[must_use]
    pub fn unwrapped(&self) -> &TypeSpec {
        match self {
            Self::Optional { inner } => inner,
            other => other,
        }
    }

    /// Whether the (unwrapped) type is numeric
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.unwrapped(), Self::Integer | Self::Float)
    }

    /// Whether the (unwrapped) type is a boolean
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        matches!(self.unwrapped(), Self::Boolean)
    }

    /// Short human name used in error messages and help tables
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::String => "a string".to_string(),
            Self::Integer => "an integer".to_string(),
            Self::Float => "a number".to_string(),
            Self::Boolean => "a boolean".to_string(),
            Self::Enum { values } => format!("one of [{}]", values.join("|")),
            Self::Array { items } => format!("a list of {}", items.label()),
            Self::Object { .. } => "an object".to_string(),
            Self::Optional { inner } => format!("{} or null", inner.describe()),
            Self::Any => "any value".to_string(),
        }
    }

    /// Compact type expression, the inverse of [`TypeSpec::parse`]
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Boolean => "bool".to_string(),
            Self::Enum { values } => format!("enum[{}]", values.join("|")),
            Self::Array { items } => format!("list[{}]", items.label()),
            Self::Object { .. } => "object".to_string(),
            Self::Optional { inner } => format!("{}?", inner.label()),
            Self::Any => "any".to_string(),
        }
    }

    /// Portable JSON-Schema-like fragment
    #[must_use]
    pub fn to_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Float => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum { values } => json!({ "type": "string", "enum": values }),
            Self::Array { items } => json!({ "type": "array", "items": items.to_schema() }),
            Self::Object { fields } => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("object"));
                if !fields.is_empty() {
                    let mut properties = Map::new();
                    for field in fields {
                        let mut prop = field.ty.to_schema();
                        if let (Some(desc), Value::Object(map)) = (&field.description, &mut prop) {
                            map.insert("description".to_string(), json!(desc));
                        }
                        properties.insert(field.name.clone(), prop);
                    }
                    let required: Vec<&str> = fields
                        .iter()
                        .filter(|f| f.required)
                        .map(|f| f.name.as_str())
                        .collect();
                    schema.insert("properties".to_string(), Value::Object(properties));
                    schema.insert("required".to_string(), json!(required));
                    schema.insert("additionalProperties".to_string(), json!(false));
                }
                Value::Object(schema)
            }
            Self::Optional { inner } => json!({ "anyOf": [inner.to_schema(), { "type": "null" }] }),
            Self::Any => json!({}),
        }
    }
}

/// Numeric and length constraints on a parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Inclusive lower bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum string length (chars) or array length (items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length (chars) or array length (items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regex a string must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Constraints {
    /// Whether no constraint is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check that every set constraint applies to `ty`
    ///
    /// # Errors
    ///
    /// Returns a description of the first misapplied constraint
    pub fn check_applicable(&self, ty: &TypeSpec) -> Result<(), String> {
        let base = ty.unwrapped();
        if (self.minimum.is_some() || self.maximum.is_some()) && !ty.is_numeric() {
            return Err(format!("numeric bounds do not apply to {}", base.label()));
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(format!("minimum {min} exceeds maximum {max}"));
            }
        }
        let has_length = self.min_length.is_some() || self.max_length.is_some();
        if has_length && !matches!(base, TypeSpec::String | TypeSpec::Array { .. }) {
            return Err(format!("length bounds do not apply to {}", base.label()));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(format!("min_length {min} exceeds max_length {max}"));
            }
        }
        if self.pattern.is_some() && !matches!(base, TypeSpec::String) {
            return Err(format!("pattern does not apply to {}", base.label()));
        }
        Ok(())
    }

    /// Merge the constraint keywords into a schema fragment
    pub fn apply_to_schema(&self, ty: &TypeSpec, schema: &mut Map<String, Value>) {
        let integral = matches!(ty.unwrapped(), TypeSpec::Integer);
        let number = |n: f64| {
            if integral && n.fract() == 0.0 {
                json!(n as i64)
            } else {
                json!(n)
            }
        };
        if let Some(min) = self.minimum {
            schema.insert("minimum".to_string(), number(min));
        }
        if let Some(max) = self.maximum {
            schema.insert("maximum".to_string(), number(max));
        }
        let (min_key, max_key) = match ty.unwrapped() {
            TypeSpec::Array { .. } => ("minItems", "maxItems"),
            _ => ("minLength", "maxLength"),
        };
        if let Some(min) = self.min_length {
            schema.insert(min_key.to_string(), json!(min));
        }
        if let Some(max) = self.max_length {
            schema.insert(max_key.to_string(), json!(max));
        }
        if let Some(pattern) = &self.pattern {
            schema.insert("pattern".to_string(), json!(pattern));
        }
    }
}

/// Declared parameter of a command; immutable once registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name (snake_case)
    pub name: String,
    /// Declared type
    pub ty: TypeSpec,
    /// Whether the caller must supply a value
    pub required: bool,
    /// Value used when the caller omits the parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Free-text help
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Numeric and length constraints
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
}

impl ParameterSpec {
    /// A required parameter with no default
    #[must_use]
    pub fn required(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            help: None,
            constraints: Constraints::default(),
        }
    }

    /// An optional parameter; `default` may be `None` for optional types
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: TypeSpec, default: Option<Value>) -> Self {
        Self {
            required: false,
            default,
            ..Self::required(name, ty)
        }
    }

    /// Set help text
    #[must_use]
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Set inclusive minimum
    #[must_use]
    pub fn min(mut self, minimum: f64) -> Self {
        self.constraints.minimum = Some(minimum);
        self
    }

    /// Set inclusive maximum
    #[must_use]
    pub fn max(mut self, maximum: f64) -> Self {
        self.constraints.maximum = Some(maximum);
        self
    }

    /// Set minimum length
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.constraints.min_length = Some(len);
        self
    }

    /// Set maximum length
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.constraints.max_length = Some(len);
        self
    }

    /// Set a regex the value must match
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.constraints.pattern = Some(pattern.into());
        self
    }

    /// CLI flag spelling, e.g. `--max-depth`
    #[must_use]
    pub fn flag(&self) -> String {
        format!("--{}", self.name.replace('_', "-"))
    }

    /// Schema fragment for this parameter, constraints and default included
    #[must_use]
    pub fn to_schema(&self) -> Value {
        let mut schema = match self.ty.to_schema() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.constraints.apply_to_schema(&self.ty, &mut schema);
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        if let Some(help) = &self.help {
            schema.insert("description".to_string(), json!(help));
        }
        Value::Object(schema)
    }
}
