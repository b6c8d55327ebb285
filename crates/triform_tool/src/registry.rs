//! Command registry.
//!
//! Built once at startup from [`CommandSpec`] declarations, then shared
//! read-only (behind an `Arc`) by every concurrent call. Every declaration
//! problem surfaces here as a [`RegistryError`]; nothing is checked lazily
//! at call time.

use crate::schema::{ParameterSpec, TypeError, TypeSpec};
use crate::trait_::CommandHandler;
use crate::validate::{ArgumentValidator, DeclarationError, validate_command_name};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use triform_core::{CapabilityError, CapabilitySet, ErrorCode, Suggestion, Version};

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name already taken
    #[error("command already registered: {0}")]
    DuplicateCommand(String),
    /// Parameter or return type could not be mapped
    #[error("command '{command}', {target}: {source}")]
    InvalidType {
        /// Command name
        command: String,
        /// Parameter name, or `returns`
        target: String,
        /// Type problem
        source: TypeError,
    },
    /// Name, constraint or default problem
    #[error("command '{command}': {source}")]
    Declaration {
        /// Command name
        command: String,
        /// Declaration problem
        source: DeclarationError,
    },
    /// Two parameters share a name
    #[error("command '{command}': parameter '{param}' declared twice")]
    DuplicateParameter {
        /// Command name
        command: String,
        /// Parameter name
        param: String,
    },
    /// Capability string is malformed
    #[error("command '{command}': {source}")]
    InvalidCapability {
        /// Command name
        command: String,
        /// Parse problem
        source: CapabilityError,
    },
    /// `read_only` and `destructive` both set
    #[error("command '{0}' cannot be both read-only and destructive")]
    ConflictingFlags(String),
}

/// Application identity reported in every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Application name
    pub name: String,
    /// Application version
    pub version: Version,
}

impl AppInfo {
    /// Create app info
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Behavioural flags; independent booleans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    /// No side effects
    pub read_only: bool,
    /// May destroy data; needs confirmation
    pub destructive: bool,
    /// Safe to repeat with the same arguments
    pub idempotent: bool,
    /// Talks to systems outside the host
    pub open_world: bool,
}

/// Deprecation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    /// Notice shown to callers
    pub message: String,
    /// Version the deprecation was introduced in
    pub since: Version,
    /// Command to use instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl Deprecation {
    /// Create a deprecation record
    #[must_use]
    pub fn new(message: impl Into<String>, since: Version) -> Self {
        Self {
            message: message.into(),
            since,
            replacement: None,
        }
    }

    /// Point callers at a replacement command
    #[must_use]
    pub fn replaced_by(mut self, command: impl Into<String>) -> Self {
        self.replacement = Some(command.into());
        self
    }
}

/// Registered command metadata; immutable after registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMeta {
    /// Unique command name
    pub name: String,
    /// One-line description
    pub description: String,
    /// Parameters in declaration order
    pub params: Vec<ParameterSpec>,
    /// Return type
    pub returns: TypeSpec,
    /// Declared capabilities
    pub capabilities: CapabilitySet,
    /// Behavioural flags
    pub behavior: Behavior,
    /// Deprecation record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    /// Suggestion templates keyed by error code
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub suggestions: IndexMap<String, Suggestion>,
    /// Whether a side-effect-free preview path exists
    pub supports_dry_run: bool,
}

impl CommandMeta {
    /// Look up a parameter
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Suggestion template for a code, if declared
    #[must_use]
    pub fn suggestion_for(&self, code: &ErrorCode) -> Option<&Suggestion> {
        self.suggestions.get(code.as_str())
    }
}

#[derive(Debug, Clone)]
enum PendingType {
    Spec(TypeSpec),
    Expr(String),
}

impl PendingType {
    fn resolve(self) -> Result<TypeSpec, TypeError> {
        let spec = match self {
            Self::Spec(spec) => spec,
            Self::Expr(expr) => TypeSpec::parse(&expr)?,
        };
        spec.check()?;
        Ok(spec)
    }
}

#[derive(Debug, Clone)]
struct PendingParam {
    spec: ParameterSpec,
    expr: Option<String>,
}

/// Builder for one command declaration
#[derive(Debug, Clone)]
pub struct CommandSpec {
    name: String,
    description: String,
    params: Vec<PendingParam>,
    returns: PendingType,
    capabilities: Vec<String>,
    behavior: Behavior,
    deprecation: Option<Deprecation>,
    suggestions: IndexMap<String, Suggestion>,
}

impl CommandSpec {
    /// Start a declaration; returns `any` until told otherwise
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            returns: PendingType::Spec(TypeSpec::Any),
            capabilities: Vec::new(),
            behavior: Behavior::default(),
            deprecation: None,
            suggestions: IndexMap::new(),
        }
    }

    /// Set description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a fully built parameter
    #[must_use]
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(PendingParam { spec, expr: None });
        self
    }

    /// Add a required parameter from a type expression such as `list[string]`
    #[must_use]
    pub fn arg(self, name: impl Into<String>, expr: &str) -> Self {
        self.arg_with(ParameterSpec::required(name, TypeSpec::Any), expr)
    }

    /// Add an optional parameter from a type expression with a default
    #[must_use]
    pub fn arg_default(self, name: impl Into<String>, expr: &str, default: Value) -> Self {
        self.arg_with(
            ParameterSpec::optional(name, TypeSpec::Any, Some(default)),
            expr,
        )
    }

    /// Add a parameter whose type comes from `expr`; the placeholder type in
    /// `spec` is replaced at registration
    #[must_use]
    pub fn arg_with(mut self, spec: ParameterSpec, expr: &str) -> Self {
        self.params.push(PendingParam {
            spec,
            expr: Some(expr.to_string()),
        });
        self
    }

    /// Set return type
    #[must_use]
    pub fn returns(mut self, ty: TypeSpec) -> Self {
        self.returns = PendingType::Spec(ty);
        self
    }

    /// Set return type from an expression
    #[must_use]
    pub fn returns_expr(mut self, expr: &str) -> Self {
        self.returns = PendingType::Expr(expr.to_string());
        self
    }

    /// Declare a required capability such as `fs:write`
    #[must_use]
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Mark read-only
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.behavior.read_only = true;
        self
    }

    /// Mark destructive
    #[must_use]
    pub fn destructive(mut self) -> Self {
        self.behavior.destructive = true;
        self
    }

    /// Mark idempotent
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.behavior.idempotent = true;
        self
    }

    /// Mark open-world
    #[must_use]
    pub fn open_world(mut self) -> Self {
        self.behavior.open_world = true;
        self
    }

    /// Mark deprecated
    #[must_use]
    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.deprecation = Some(deprecation);
        self
    }

    /// Attach a suggestion template for an error code.
    ///
    /// `{field}` and `{command}` in the template are filled in when used.
    #[must_use]
    pub fn suggest(mut self, code: impl Into<ErrorCode>, suggestion: Suggestion) -> Self {
        self.suggestions
            .insert(code.into().as_str().to_string(), suggestion);
        self
    }

    fn build(self, supports_dry_run: bool) -> Result<(CommandMeta, ArgumentValidator), RegistryError> {
        let command = self.name;
        validate_command_name(&command).map_err(|source| RegistryError::Declaration {
            command: command.clone(),
            source,
        })?;
        if self.behavior.read_only && self.behavior.destructive {
            return Err(RegistryError::ConflictingFlags(command));
        }

        let mut params = Vec::with_capacity(self.params.len());
        let mut seen = BTreeSet::new();
        for PendingParam { mut spec, expr } in self.params {
            if !seen.insert(spec.name.clone()) {
                return Err(RegistryError::DuplicateParameter {
                    command,
                    param: spec.name,
                });
            }
            let pending = match expr {
                Some(expr) => PendingType::Expr(expr),
                None => PendingType::Spec(spec.ty.clone()),
            };
            spec.ty = pending.resolve().map_err(|source| RegistryError::InvalidType {
                command: command.clone(),
                target: spec.name.clone(),
                source,
            })?;
            params.push(spec);
        }

        let returns = self
            .returns
            .resolve()
            .map_err(|source| RegistryError::InvalidType {
                command: command.clone(),
                target: "returns".to_string(),
                source,
            })?;

        let capabilities = CapabilitySet::parse(&self.capabilities).map_err(|source| {
            RegistryError::InvalidCapability {
                command: command.clone(),
                source,
            }
        })?;

        let validator =
            ArgumentValidator::compile(&params).map_err(|source| RegistryError::Declaration {
                command: command.clone(),
                source,
            })?;

        let meta = CommandMeta {
            name: command,
            description: self.description,
            params,
            returns,
            capabilities,
            behavior: self.behavior,
            deprecation: self.deprecation,
            suggestions: self.suggestions,
            supports_dry_run,
        };
        Ok((meta, validator))
    }
}

/// A command ready to dispatch
#[derive(Clone)]
pub struct RegisteredCommand {
    meta: Arc<CommandMeta>,
    handler: Arc<dyn CommandHandler>,
    validator: ArgumentValidator,
}

impl RegisteredCommand {
    /// Metadata
    #[must_use]
    pub fn meta(&self) -> &Arc<CommandMeta> {
        &self.meta
    }

    /// Handler
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    /// Argument validator
    #[must_use]
    pub fn validator(&self) -> &ArgumentValidator {
        &self.validator
    }
}

impl std::fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Registry of all commands in one application
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    app: AppInfo,
    commands: IndexMap<String, RegisteredCommand>,
}

impl CommandRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(app: AppInfo) -> Self {
        Self {
            app,
            commands: IndexMap::new(),
        }
    }

    /// Application identity
    #[must_use]
    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    /// Register a command
    ///
    /// # Errors
    ///
    /// Returns error if the name is taken or the declaration is invalid
    pub fn register<H>(&mut self, spec: CommandSpec, handler: H) -> Result<Arc<CommandMeta>, RegistryError>
    where
        H: CommandHandler + 'static,
    {
        self.register_arc(spec, Arc::new(handler))
    }

    /// Register a command with a shared handler
    ///
    /// # Errors
    ///
    /// Returns error if the name is taken or the declaration is invalid
    pub fn register_arc(
        &mut self,
        spec: CommandSpec,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Arc<CommandMeta>, RegistryError> {
        if self.commands.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateCommand(spec.name));
        }
        let (meta, validator) = spec.build(handler.supports_dry_run())?;
        let meta = Arc::new(meta);
        tracing::debug!(command = %meta.name, params = meta.params.len(), "registered command");
        self.commands.insert(
            meta.name.clone(),
            RegisteredCommand {
                meta: Arc::clone(&meta),
                handler,
                validator,
            },
        );
        Ok(meta)
    }

    /// Get a command by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredCommand> {
        self.commands.get(name)
    }

    /// Check if a command is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Metadata for every command, in registration order
    pub fn list(&self) -> impl Iterator<Item = &Arc<CommandMeta>> {
        self.commands.values().map(|c| &c.meta)
    }

    /// Command names sorted alphabetically
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trait_::{Arguments, FnHandler};
    use serde_json::json;

    fn app() -> CommandRegistry {
        CommandRegistry::new(AppInfo::new("demo", Version::new(1, 2, 0)))
    }

    fn noop() -> FnHandler {
        FnHandler::new(|_: Arguments| async { Ok(json!(null)) })
    }

    fn find_files() -> CommandSpec {
        CommandSpec::new("find_files")
            .describe("Find files matching a glob")
            .arg("pattern", "string")
            .arg_default("root", "string", json!("."))
            .returns_expr("list[string]")
            .requires("fs:read")
            .read_only()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = app();
        let meta = registry.register(find_files(), noop()).unwrap();
        assert_eq!(meta.name, "find_files");
        assert_eq!(meta.params.len(), 2);
        assert_eq!(meta.params[0].ty, TypeSpec::String);
        assert!(meta.params[0].required);
        assert_eq!(meta.params[1].default, Some(json!(".")));
        assert_eq!(meta.returns, TypeSpec::array(TypeSpec::String));
        assert!(!meta.supports_dry_run);
        assert!(registry.contains("find_files"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_command() {
        let mut registry = app();
        registry.register(find_files(), noop()).unwrap();
        let err = registry.register(find_files(), noop()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateCommand("find_files".to_string()));
    }

    #[test]
    fn test_unsupported_type_fails_at_registration() {
        let mut registry = app();
        let err = registry
            .register(CommandSpec::new("when").arg("at", "datetime"), noop())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidType { ref target, source: TypeError::Unsupported(_), .. } if target == "at"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_declaration_errors() {
        let mut registry = app();
        assert!(matches!(
            registry.register(CommandSpec::new("Bad"), noop()),
            Err(RegistryError::Declaration { .. })
        ));
        assert!(matches!(
            registry.register(CommandSpec::new("rm").read_only().destructive(), noop()),
            Err(RegistryError::ConflictingFlags(_))
        ));
        assert!(matches!(
            registry.register(CommandSpec::new("dup").arg("a", "int").arg("a", "int"), noop()),
            Err(RegistryError::DuplicateParameter { .. })
        ));
        assert!(matches!(
            registry.register(CommandSpec::new("cap").requires("fs"), noop()),
            Err(RegistryError::InvalidCapability { .. })
        ));
        assert!(matches!(
            registry.register(CommandSpec::new("ret").returns_expr("enum[]"), noop()),
            Err(RegistryError::InvalidType { .. })
        ));
        assert!(matches!(
            registry.register(
                CommandSpec::new("def").arg_default("n", "int", json!("seven")),
                noop()
            ),
            Err(RegistryError::Declaration { .. })
        ));
    }

    #[test]
    fn test_suggestion_templates_keyed_by_code() {
        let mut registry = app();
        let meta = registry
            .register(
                find_files().suggest(
                    ErrorCode::NotFound,
                    Suggestion::new("change_root", "check that {field} exists"),
                ),
                noop(),
            )
            .unwrap();
        assert!(meta.suggestion_for(&ErrorCode::NotFound).is_some());
        assert!(meta.suggestion_for(&ErrorCode::Conflict).is_none());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = app();
        registry.register(CommandSpec::new("zeta"), noop()).unwrap();
        registry.register(CommandSpec::new("alpha"), noop()).unwrap();
        assert_eq!(registry.names(), ["alpha", "zeta"]);
        let order: Vec<&str> = registry.list().map(|m| m.name.as_str()).collect();
        assert_eq!(order, ["zeta", "alpha"]);
    }

    #[test]
    fn test_dry_run_support_mirrors_handler() {
        let mut registry = app();
        let handler = noop().with_preview(|_| async { Ok(json!("preview")) });
        let meta = registry.register(CommandSpec::new("rm").destructive(), handler).unwrap();
        assert!(meta.supports_dry_run);
    }
}
