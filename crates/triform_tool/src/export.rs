//! Schema export.
//!
//! A pure function of the registry: per command, the parameter schema,
//! return schema, capabilities, behaviour flags and deprecation record. The
//! document is canonicalized and fingerprinted so consumers can detect drift
//! between versions by comparing one hash.

use crate::normalize::{canonicalize, to_canonical_bytes, to_canonical_string};
use crate::registry::{CommandMeta, CommandRegistry};
use serde_json::{Map, Value, json};
use triform_core::Fingerprint;

/// Exported schema document with its fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaExport {
    /// Canonical document, without the fingerprint
    pub document: Value,
    /// BLAKE3 over the canonical compact bytes of `document`
    pub fingerprint: Fingerprint,
}

impl SchemaExport {
    /// Canonical pretty JSON with the fingerprint folded in
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_canonical_string(&self) -> serde_json::Result<String> {
        let mut document = self.document.clone();
        if let Value::Object(map) = &mut document {
            map.insert("fingerprint".to_string(), json!(self.fingerprint.to_hex()));
        }
        to_canonical_string(&document)
    }
}

/// Object schema for a command's parameters
#[must_use]
pub fn parameters_schema(meta: &CommandMeta) -> Value {
    let mut properties = Map::new();
    for param in &meta.params {
        properties.insert(param.name.clone(), param.to_schema());
    }
    let required: Vec<&str> = meta
        .params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Full schema entry for one command
#[must_use]
pub fn command_schema(meta: &CommandMeta) -> Value {
    let mut entry = json!({
        "name": meta.name,
        "description": meta.description,
        "parameters": parameters_schema(meta),
        "returns": meta.returns.to_schema(),
        "capabilities": meta.capabilities,
        "behavior": meta.behavior,
        "supports_dry_run": meta.supports_dry_run,
    });
    if let (Some(deprecation), Value::Object(map)) = (&meta.deprecation, &mut entry) {
        map.insert("deprecated".to_string(), json!(deprecation));
    }
    if !meta.suggestions.is_empty() {
        if let Value::Object(map) = &mut entry {
            map.insert("suggestions".to_string(), json!(meta.suggestions));
        }
    }
    canonicalize(entry)
}

/// Export every command
///
/// # Errors
///
/// Returns error if serialization fails
pub fn export_schema(registry: &CommandRegistry) -> serde_json::Result<SchemaExport> {
    let commands: Map<String, Value> = registry
        .list()
        .map(|meta| (meta.name.clone(), command_schema(meta)))
        .collect();
    let document = canonicalize(json!({
        "app": registry.app().name,
        "version": registry.app().version,
        "commands": commands,
    }));
    let fingerprint = Fingerprint::compute(&to_canonical_bytes(&document)?);
    Ok(SchemaExport {
        document,
        fingerprint,
    })
}

/// Wire-protocol tool definitions, in name order
#[must_use]
pub fn tool_definitions(registry: &CommandRegistry) -> Vec<Value> {
    registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(name))
        .map(|command| {
            let meta = command.meta();
            canonicalize(json!({
                "name": meta.name,
                "description": meta.description,
                "inputSchema": parameters_schema(meta),
                "annotations": {
                    "readOnlyHint": meta.behavior.read_only,
                    "destructiveHint": meta.behavior.destructive,
                    "idempotentHint": meta.behavior.idempotent,
                    "openWorldHint": meta.behavior.open_world,
                },
            }))
        })
        .collect()
}
