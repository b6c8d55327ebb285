//! triform command model
//!
//! Type mapper, command registry, input adapters, argument validation and
//! schema export. A command is declared once with a [`CommandSpec`] and a
//! [`CommandHandler`]; everything the surfaces need is derived from that.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod export;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod trait_;
pub mod validate;

pub use adapter::{AdapterError, RawInput, parse_keywords, parse_tokens};
pub use export::{SchemaExport, command_schema, export_schema, parameters_schema, tool_definitions};
pub use normalize::{canonicalize, to_canonical_bytes, to_canonical_string};
pub use registry::{
    AppInfo, Behavior, CommandMeta, CommandRegistry, CommandSpec, Deprecation, RegisteredCommand,
    RegistryError,
};
pub use schema::{Constraints, FieldSpec, ParameterSpec, TypeError, TypeSpec};
pub use trait_::{Arguments, CommandHandler, CommandOutput, FnHandler};
pub use validate::{ArgumentValidator, DeclarationError, check_value};
