//! Command handler trait and the typed argument map handed to it.

use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use triform_core::ToolError;

/// What a command body returns.
///
/// Returning a [`ToolError`] (via `?` or `.into()`) keeps its category;
/// any other error becomes an `internal` failure.
pub type CommandOutput = anyhow::Result<Value>;

/// Validated, typed arguments for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: IndexMap<String, Value>,
}

impl Arguments {
    /// Wrap an already validated map
    #[must_use]
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    /// Raw value, if present
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserialize a present, non-null argument
    ///
    /// # Errors
    ///
    /// E1001 if absent or null, E1002 if it does not deserialize into `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        self.get_opt(name)?
            .ok_or_else(|| ToolError::missing_argument(name))
    }

    /// Deserialize an argument that may be absent or null
    ///
    /// # Errors
    ///
    /// E1002 if the value does not deserialize into `T`
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ToolError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|_| {
                let expected = format!("a value this command accepts, got {}", json_kind(value));
                ToolError::invalid_type(name, &expected)
            }),
        }
    }

    /// Borrow a string argument
    ///
    /// # Errors
    ///
    /// E1001 if absent, E1002 if not a string
    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Err(ToolError::missing_argument(name)),
            Some(value) => value
                .as_str()
                .ok_or_else(|| ToolError::invalid_type(name, "a string")),
        }
    }

    /// Boolean argument, `false` when absent
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in parameter declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Underlying map
    #[must_use]
    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A command body, with an optional side-effect-free preview path
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command for real
    async fn execute(&self, args: Arguments) -> CommandOutput;

    /// Whether [`CommandHandler::preview`] is implemented
    fn supports_dry_run(&self) -> bool {
        false
    }

    /// Describe what `execute` would do without doing it.
    ///
    /// The dispatcher only calls this when `supports_dry_run` is true; the
    /// author is trusted to keep this path free of mutation.
    async fn preview(&self, _args: Arguments) -> CommandOutput {
        Err(ToolError::dry_run_unsupported("command").into())
    }
}

type BoxedBody = Arc<dyn Fn(Arguments) -> BoxFuture<'static, CommandOutput> + Send + Sync>;

/// Handler built from closures
#[derive(Clone)]
pub struct FnHandler {
    body: BoxedBody,
    preview: Option<BoxedBody>,
}

impl FnHandler {
    /// Async body
    #[must_use]
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandOutput> + Send + 'static,
    {
        Self {
            body: boxed(body),
            preview: None,
        }
    }

    /// Blocking body, run on the blocking thread pool
    #[must_use]
    pub fn blocking<F>(body: F) -> Self
    where
        F: Fn(Arguments) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            body: boxed_blocking(body),
            preview: None,
        }
    }

    /// Attach an async preview path
    #[must_use]
    pub fn with_preview<F, Fut>(mut self, preview: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandOutput> + Send + 'static,
    {
        self.preview = Some(boxed(preview));
        self
    }

    /// Attach a blocking preview path
    #[must_use]
    pub fn with_blocking_preview<F>(mut self, preview: F) -> Self
    where
        F: Fn(Arguments) -> CommandOutput + Send + Sync + 'static,
    {
        self.preview = Some(boxed_blocking(preview));
        self
    }
}

fn boxed<F, Fut>(f: F) -> BoxedBody
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandOutput> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

fn boxed_blocking<F>(f: F) -> BoxedBody
where
    F: Fn(Arguments) -> CommandOutput + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |args| {
        let f = Arc::clone(&f);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || f(args)).await {
                Ok(output) => output,
                Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                Err(join) => Err(anyhow::anyhow!("blocking command body was cancelled: {join}")),
            }
        })
    })
}

#[async_trait]
impl CommandHandler for FnHandler {
    async fn execute(&self, args: Arguments) -> CommandOutput {
        (self.body)(args).await
    }

    fn supports_dry_run(&self) -> bool {
        self.preview.is_some()
    }

    async fn preview(&self, args: Arguments) -> CommandOutput {
        match &self.preview {
            Some(preview) => preview(args).await,
            None => Err(ToolError::dry_run_unsupported("command").into()),
        }
    }
}
