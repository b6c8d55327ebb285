//! Invocation dispatcher.
//!
//! One call walks a fixed sequence of states:
//!
//! ```text
//! Received -> Parsed -> Validated -> Authorized -> DryRunPreview | Executing
//!          -> Succeeded | Failed -> Enveloped
//! ```
//!
//! Any failing step jumps straight to `Failed`. The command body never runs
//! before authorization succeeds, and the envelope is built exactly once.
//! There are no retries here; callers decide using `is_retryable`.
//!
//! Bodies run on their own tokio task. A deadline aborts the task at its
//! next suspension point; a body stuck in blocking code keeps its blocking
//! thread until it returns, but its result is discarded.

use crate::config::{ConfigError, RuntimeConfig};
use crate::context::{CallOptions, ExecutionContext};
use crate::router::{OutputFormat, RenderedOutput, route};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use triform_context::{CallerCache, CallerDetector, CallerInfo};
use triform_core::{Envelope, EnvelopeBuilder, ErrorCode, SessionId, Suggestion, ToolError};
use triform_policy::{AllowList, authorize};
use triform_tool::{Arguments, CommandHandler, CommandMeta, CommandRegistry, RawInput};

/// Finished call: the envelope plus the context it was produced under
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The envelope
    pub envelope: Envelope,
    /// The call's context
    pub context: ExecutionContext,
}

impl Outcome {
    /// CLI exit code
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.envelope.exit_code()
    }

    /// Render for the caller
    #[must_use]
    pub fn render(&self) -> RenderedOutput {
        route(&self.envelope, &self.context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyPath {
    Preview,
    Execute,
}

/// Runs commands from a shared, read-only registry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    allow_list: Option<AllowList>,
    default_timeout: Option<Duration>,
    max_result_items: Option<usize>,
    default_format: Option<OutputFormat>,
    session_id: Option<SessionId>,
    caller_cache: Arc<CallerCache>,
}

impl Dispatcher {
    /// Dispatcher with the policy disabled and no deadline
    #[must_use]
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            allow_list: None,
            default_timeout: None,
            max_result_items: None,
            default_format: None,
            session_id: None,
            caller_cache: Arc::default(),
        }
    }

    /// Dispatcher configured from [`RuntimeConfig`]
    ///
    /// # Errors
    ///
    /// Returns error if the configured allow-list is invalid
    pub fn from_config(
        registry: Arc<CommandRegistry>,
        config: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            registry,
            allow_list: config.allow_list()?,
            default_timeout: config.timeout(),
            max_result_items: config.max_result_items,
            default_format: config.format,
            session_id: config.session(),
            caller_cache: Arc::default(),
        })
    }

    /// Set the allow-list; `None` disables the policy
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: Option<AllowList>) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Set the default deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Cut array results to `limit` items
    #[must_use]
    pub fn with_max_result_items(mut self, limit: Option<usize>) -> Self {
        self.max_result_items = limit;
        self
    }

    /// Share the application's caller detection cache
    #[must_use]
    pub fn with_caller_cache(mut self, cache: Arc<CallerCache>) -> Self {
        self.caller_cache = cache;
        self
    }

    /// The registry
    #[must_use]
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Invoke `command` with raw input on behalf of `caller`
    pub async fn dispatch(
        &self,
        command: &str,
        input: RawInput,
        caller: CallerInfo,
        options: CallOptions,
    ) -> Outcome {
        let started = Instant::now();
        let mut ctx = self.context(caller, options);
        let span = tracing::info_span!("dispatch", command, dry_run = ctx.dry_run);
        let result = self
            .run(command, Ok(input), &mut ctx)
            .instrument(span)
            .await;
        self.envelope(command, result, ctx, started)
    }

    /// In-process call with keyword arguments as a JSON object
    pub async fn call(&self, command: &str, args: Value, options: CallOptions) -> Outcome {
        let caller = self
            .caller_cache
            .get_or_detect_in_process(&CallerDetector::system())
            .clone();
        self.call_as(command, args, caller, options).await
    }

    /// In-process call on behalf of a known caller
    pub async fn call_as(
        &self,
        command: &str,
        args: Value,
        caller: CallerInfo,
        options: CallOptions,
    ) -> Outcome {
        let started = Instant::now();
        let mut ctx = self.context(caller, options);
        let span = tracing::info_span!("dispatch", command, dry_run = ctx.dry_run);
        let result = self
            .run(command, RawInput::from_json(args), &mut ctx)
            .instrument(span)
            .await;
        self.envelope(command, result, ctx, started)
    }

    fn context(&self, caller: CallerInfo, mut options: CallOptions) -> ExecutionContext {
        options.format = options.format.or(self.default_format);
        options.timeout = options.timeout.or(self.default_timeout);
        options.session_id = options.session_id.or_else(|| self.session_id.clone());
        ExecutionContext::for_call(caller, options)
    }

    async fn run(
        &self,
        name: &str,
        input: Result<RawInput, ToolError>,
        ctx: &mut ExecutionContext,
    ) -> Result<(Value, bool), ToolError> {
        let command = self
            .registry
            .get(name)
            .ok_or_else(|| self.unknown_command(name))?;
        let meta = command.meta();

        if let Some(deprecation) = &meta.deprecation {
            tracing::warn!(
                since = %deprecation.since,
                replacement = deprecation.replacement.as_deref(),
                "deprecated command invoked"
            );
            let mut notice = format!(
                "'{name}' is deprecated since {}: {}",
                deprecation.since, deprecation.message
            );
            if let Some(replacement) = &deprecation.replacement {
                notice.push_str(&format!(" (use '{replacement}')"));
            }
            ctx.notices.push(notice);
        }

        let result = async {
            let args = input?.adapt(&meta.params)?;
            tracing::debug!(args = args.len(), "parsed");

            command.validator().validate(&meta.params, &args)?;
            tracing::debug!("validated");

            authorize(&meta.capabilities, self.allow_list.as_ref()).into_result()?;
            tracing::debug!("authorized");

            let path = if ctx.dry_run {
                if !meta.supports_dry_run {
                    return Err(ToolError::dry_run_unsupported(name));
                }
                BodyPath::Preview
            } else {
                if meta.behavior.destructive && !ctx.confirmed {
                    return Err(ToolError::confirmation_required(name));
                }
                BodyPath::Execute
            };

            let value = run_body(
                Arc::clone(command.handler()),
                Arguments::new(args),
                path,
                ctx.deadline,
            )
            .await?;
            Ok::<_, ToolError>(truncate(value, self.max_result_items))
        }
        .await;

        result.map_err(|err| with_suggestion(err, meta))
    }

    fn unknown_command(&self, name: &str) -> ToolError {
        let available = self.registry.names().join(", ");
        ToolError::not_found("command", name).with_suggestion(
            Suggestion::new("list_commands", format!("available commands: {available}"))
                .with_example(self.registry.app().name.clone()),
        )
    }

    fn envelope(
        &self,
        command: &str,
        result: Result<(Value, bool), ToolError>,
        ctx: ExecutionContext,
        started: Instant,
    ) -> Outcome {
        let builder = EnvelopeBuilder::new(command, self.registry.app().version.to_string())
            .duration(started.elapsed())
            .caller_id(ctx.caller.caller_id())
            .session_id(ctx.session_id.as_ref().map(ToString::to_string))
            .dry_run(ctx.dry_run);
        let envelope = match result {
            Ok((value, truncated)) => {
                tracing::debug!(command, truncated, "succeeded");
                builder.truncated(truncated).success(value)
            }
            Err(error) => {
                tracing::debug!(command, code = %error.code, category = %error.category, "failed");
                builder.failure(error)
            }
        };
        Outcome {
            envelope,
            context: ctx,
        }
    }
}

/// Run the handler on its own task so panics and deadlines stay contained
async fn run_body(
    handler: Arc<dyn CommandHandler>,
    args: Arguments,
    path: BodyPath,
    deadline: Option<Duration>,
) -> Result<Value, ToolError> {
    tracing::debug!(?path, "executing");
    let task = tokio::spawn(
        async move {
            match path {
                BodyPath::Preview => handler.preview(args).await,
                BodyPath::Execute => handler.execute(args).await,
            }
        }
        .instrument(tracing::Span::current()),
    );

    let joined = match deadline {
        Some(limit) => {
            let abort = task.abort_handle();
            match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    tracing::warn!(limit_ms, "deadline exceeded, body abandoned");
                    return Err(ToolError::timeout(limit_ms));
                }
            }
        }
        None => task.await,
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify(err)),
        Err(join) if join.is_panic() => {
            let detail = panic_message(join.into_panic());
            tracing::error!(panic = %detail, "command body panicked");
            Err(ToolError::internal())
        }
        Err(join) => {
            tracing::error!(error = %join, "command task was cancelled");
            Err(ToolError::internal())
        }
    }
}

/// `ToolError`s pass through; anything else is internal and only logged
fn classify(err: anyhow::Error) -> ToolError {
    match err.downcast::<ToolError>() {
        Ok(tool) => tool,
        Err(other) => {
            let detail = format!("{other:#}");
            tracing::error!(error = %detail, "command failed with an unclassified error");
            ToolError::internal()
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Attach the command's template for this code, or the built-in hint for a
/// missing argument; an author-supplied suggestion is left alone
fn with_suggestion(mut err: ToolError, meta: &CommandMeta) -> ToolError {
    if err.suggestion.is_some() {
        return err;
    }
    let field = err.field.clone().unwrap_or_default();
    if let Some(template) = meta.suggestion_for(&err.code) {
        err.suggestion = Some(template.render(&[("field", &field), ("command", &meta.name)]));
    } else if err.code == ErrorCode::MissingArgument && !field.is_empty() {
        let flag = meta
            .param(&field)
            .map_or_else(|| format!("--{field}"), |p| p.flag());
        err.suggestion = Some(
            Suggestion::new("add_argument", format!("provide a value for '{field}'"))
                .with_example(format!("{} {flag} <value>", meta.name)),
        );
    }
    err
}

fn truncate(value: Value, limit: Option<usize>) -> (Value, bool) {
    match (value, limit) {
        (Value::Array(mut items), Some(max)) if items.len() > max => {
            items.truncate(max);
            (Value::Array(items), true)
        }
        (value, _) => (value, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use triform_context::{CallerCategory, Signal, StaticProbe};
    use triform_core::{ENV_CALLER, ErrorCategory, Version};
    use triform_tool::{AppInfo, CommandSpec, Deprecation, FnHandler};

    /// In-memory filesystem double
    #[derive(Default)]
    struct FakeFs {
        files: Mutex<BTreeMap<String, String>>,
        writes: AtomicUsize,
    }

    impl FakeFs {
        fn write(&self, path: &str, body: &str) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), body.to_string());
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    fn agent() -> CallerInfo {
        CallerInfo::from_explicit("agent:test-agent").unwrap()
    }

    fn registry(fs: &Arc<FakeFs>) -> Arc<CommandRegistry> {
        let mut registry = CommandRegistry::new(AppInfo::new("demo", Version::new(1, 0, 0)));

        registry
            .register(
                CommandSpec::new("find_files")
                    .arg("pattern", "string")
                    .arg_default("root", "string", json!("."))
                    .returns_expr("list[string]")
                    .requires("fs:read")
                    .read_only(),
                FnHandler::new(|args: Arguments| async move {
                    let pattern: String = args.get("pattern")?;
                    Ok(json!([format!("{}/{pattern}", args.str("root")?)]))
                }),
            )
            .unwrap();

        let exec_fs = Arc::clone(fs);
        registry
            .register(
                CommandSpec::new("write_file")
                    .arg("path", "string")
                    .arg("body", "string")
                    .requires("fs:write")
                    .destructive(),
                FnHandler::new(move |args: Arguments| {
                    let fs = Arc::clone(&exec_fs);
                    async move {
                        fs.write(args.str("path")?, args.str("body")?);
                        Ok(json!({"written": args.str("path")?}))
                    }
                })
                .with_preview(|args: Arguments| async move {
                    Ok(json!({"would_write": args.str("path")?}))
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("slow").suggest(
                    ErrorCode::Timeout,
                    Suggestion::new("raise_timeout", "give {command} a longer --timeout"),
                ),
                FnHandler::new(|_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(json!("done"))
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("explode"),
                FnHandler::new(|args: Arguments| async move {
                    if args.is_empty() {
                        panic!("secret internal detail");
                    }
                    Ok(json!(null))
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("io_fail"),
                FnHandler::blocking(|_| {
                    Err(anyhow::anyhow!("disk /dev/sda1 is on fire"))
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("lookup")
                    .arg("key", "string")
                    .suggest(
                        ErrorCode::NotFound,
                        Suggestion::new("try_other_key", "no entry for {field} in {command}"),
                    ),
                FnHandler::new(|_| async {
                    Err(ToolError::not_found("entry", "x").with_field("key").into())
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("sneaky"),
                FnHandler::new(|_| async {
                    Err(ToolError::permission_denied("no")
                        .with_retryable(true)
                        .with_suggestion(Suggestion::new("retry", "just retry").with_retry(true))
                        .into())
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("flaky"),
                FnHandler::new(|_| async {
                    Err(ToolError::execution_failed("upstream hiccup")
                        .with_retryable(true)
                        .with_suggestion(Suggestion::new("retry", "run it again").with_retry(true))
                        .into())
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("span_name"),
                FnHandler::new(|_| async {
                    let span = tracing::Span::current();
                    Ok(json!(span.metadata().map(|m| m.name())))
                }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("many").returns_expr("list[int]"),
                FnHandler::new(|_| async { Ok(json!([1, 2, 3, 4, 5])) }),
            )
            .unwrap();

        registry
            .register(
                CommandSpec::new("old_find")
                    .deprecated(Deprecation::new("renamed", Version::new(0, 9, 0)).replaced_by("find_files")),
                FnHandler::new(|_| async { Ok(json!(null)) }),
            )
            .unwrap();

        Arc::new(registry)
    }

    fn setup() -> (Arc<FakeFs>, Dispatcher) {
        let fs = Arc::new(FakeFs::default());
        let dispatcher = Dispatcher::new(registry(&fs));
        (fs, dispatcher)
    }

    async fn call(dispatcher: &Dispatcher, command: &str, args: Value, options: CallOptions) -> Outcome {
        dispatcher.call_as(command, args, agent(), options).await
    }

    fn error(outcome: &Outcome) -> &ToolError {
        outcome.envelope.error().unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "find_files", json!({"pattern": "*.py"}), CallOptions::new()).await;
        assert!(outcome.envelope.is_ok());
        assert_eq!(outcome.envelope.result(), Some(&json!(["./*.py"])));
        assert_eq!(outcome.exit_code(), 0);
        let meta = outcome.envelope.meta();
        assert_eq!(meta.tool, "find_files");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.caller_id.as_deref(), Some("test-agent"));
        assert!(!meta.dry_run);
    }

    #[tokio::test]
    async fn test_missing_pattern_is_e1001() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "find_files", json!({"root": "/src"}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.code.as_str(), "E1001");
        assert_eq!(err.category, ErrorCategory::Input);
        assert_eq!(err.field.as_deref(), Some("pattern"));
        assert_eq!(outcome.exit_code(), 2);
        let hint = err.suggestion.as_ref().unwrap();
        assert_eq!(hint.example.as_deref(), Some("find_files --pattern <value>"));

        let line = outcome.envelope.to_json_line().unwrap();
        let wire: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(wire["ok"], false);
        assert_eq!(wire["error"]["code"], "E1001");
        assert_eq!(wire["error"]["category"], "input");
        assert_eq!(wire["error"]["field"], "pattern");
        assert!(wire.get("result").is_none());
    }

    #[tokio::test]
    async fn test_token_input_runs_same_pipeline() {
        let (_, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(
                "find_files",
                RawInput::tokens(["--root", "/src"]),
                agent(),
                CallOptions::new(),
            )
            .await;
        assert_eq!(error(&outcome).code, ErrorCode::MissingArgument);

        let outcome = dispatcher
            .dispatch("find_files", RawInput::tokens(["*.rs"]), agent(), CallOptions::new())
            .await;
        assert_eq!(outcome.envelope.result(), Some(&json!(["./*.rs"])));
    }

    #[tokio::test]
    async fn test_denied_capability_never_enters_body() {
        let (fs, dispatcher) = setup();
        let dispatcher =
            dispatcher.with_allow_list(Some(AllowList::parse("fs:read").unwrap()));
        let outcome = call(
            &dispatcher,
            "write_file",
            json!({"path": "a.txt", "body": "x"}),
            CallOptions::new().yes(true),
        )
        .await;
        let err = error(&outcome);
        assert_eq!(err.category, ErrorCategory::Auth);
        assert_eq!(err.code, ErrorCode::CapabilityDenied);
        assert!(!err.is_retryable());
        assert_eq!(outcome.exit_code(), 30);
        assert_eq!(fs.writes(), 0);

        let wire: Value = serde_json::from_str(&outcome.envelope.to_json_line().unwrap()).unwrap();
        assert_eq!(wire["error"]["is_retryable"], false);
    }

    #[tokio::test]
    async fn test_validation_precedes_authorization() {
        let (_, dispatcher) = setup();
        let dispatcher = dispatcher.with_allow_list(Some(AllowList::empty()));
        let outcome = call(&dispatcher, "write_file", json!({"path": "a"}), CallOptions::new()).await;
        assert_eq!(error(&outcome).category, ErrorCategory::Input);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let (fs, dispatcher) = setup();
        let outcome = call(
            &dispatcher,
            "write_file",
            json!({"path": "a.txt", "body": "x"}),
            CallOptions::new().dry_run(true),
        )
        .await;
        assert!(outcome.envelope.is_ok());
        assert_eq!(outcome.envelope.result(), Some(&json!({"would_write": "a.txt"})));
        assert!(outcome.envelope.meta().dry_run);
        assert_eq!(fs.writes(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_unsupported() {
        let (_, dispatcher) = setup();
        let outcome = call(
            &dispatcher,
            "find_files",
            json!({"pattern": "x"}),
            CallOptions::new().dry_run(true),
        )
        .await;
        let err = error(&outcome);
        assert_eq!(err.code, ErrorCode::DryRunUnsupported);
        assert_eq!(err.category, ErrorCategory::Input);
    }

    #[tokio::test]
    async fn test_destructive_needs_confirmation() {
        let (fs, dispatcher) = setup();
        let args = json!({"path": "a.txt", "body": "x"});
        let outcome = call(&dispatcher, "write_file", args.clone(), CallOptions::new()).await;
        assert_eq!(error(&outcome).code, ErrorCode::ConfirmationRequired);
        assert_eq!(fs.writes(), 0);

        let outcome = call(&dispatcher, "write_file", args, CallOptions::new().yes(true)).await;
        assert!(outcome.envelope.is_ok());
        assert_eq!(fs.writes(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_runtime() {
        let (_, dispatcher) = setup();
        let outcome = call(
            &dispatcher,
            "slow",
            json!({}),
            CallOptions::new().timeout(Duration::from_millis(20)),
        )
        .await;
        let err = error(&outcome);
        assert_eq!(err.code.as_str(), "timeout");
        assert_eq!(err.category, ErrorCategory::Runtime);
        assert!(err.is_retryable());
        assert_eq!(outcome.exit_code(), 50);

        let hint = err.suggestion.as_ref().unwrap();
        assert_eq!(hint.fix, "give slow a longer --timeout");
        assert!(!hint.retry);
        let wire: Value = serde_json::from_str(&outcome.envelope.to_json_line().unwrap()).unwrap();
        assert_eq!(wire["error"]["is_retryable"], true);
        assert_eq!(wire["error"]["suggestion"]["retry"], false);
    }

    #[tokio::test]
    async fn test_runtime_suggestion_never_says_retry() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "flaky", json!({}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.code, ErrorCode::ExecutionFailed);
        assert!(err.is_retryable());
        let wire: Value = serde_json::from_str(&outcome.envelope.to_json_line().unwrap()).unwrap();
        assert_eq!(wire["error"]["suggestion"]["retry"], false);
    }

    #[tokio::test]
    async fn test_default_timeout_from_dispatcher() {
        let (_, dispatcher) = setup();
        let dispatcher = dispatcher.with_timeout(Some(Duration::from_millis(20)));
        let outcome = call(&dispatcher, "slow", json!({}), CallOptions::new()).await;
        assert_eq!(error(&outcome).code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "explode", json!({}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.category, ErrorCategory::Internal);
        assert!(!err.is_retryable());
        assert!(!err.message.contains("secret"));
        assert_eq!(outcome.exit_code(), 70);
    }

    #[tokio::test]
    async fn test_foreign_error_becomes_internal() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "io_fail", json!({}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.category, ErrorCategory::Internal);
        assert!(!outcome.envelope.to_json_line().unwrap().contains("sda1"));
    }

    #[tokio::test]
    async fn test_auth_error_clamped_whatever_the_author_says() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "sneaky", json!({}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
        assert!(!err.suggestion.as_ref().unwrap().retry);
    }

    #[tokio::test]
    async fn test_suggestion_template_rendered() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "lookup", json!({"key": "k"}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.exit_code(), 10);
        assert_eq!(
            err.suggestion.as_ref().unwrap().fix,
            "no entry for key in lookup"
        );
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "nope", json!({}), CallOptions::new()).await;
        let err = error(&outcome);
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.suggestion.as_ref().unwrap().fix.contains("find_files"));
        assert_eq!(outcome.exit_code(), 10);
    }

    #[tokio::test]
    async fn test_non_object_arguments() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "find_files", json!("*.py"), CallOptions::new()).await;
        assert_eq!(error(&outcome).code, ErrorCode::InvalidType);
    }

    #[tokio::test]
    async fn test_truncation() {
        let (_, dispatcher) = setup();
        let dispatcher = dispatcher.with_max_result_items(Some(2));
        let outcome = call(&dispatcher, "many", json!({}), CallOptions::new()).await;
        assert_eq!(outcome.envelope.result(), Some(&json!([1, 2])));
        assert!(outcome.envelope.meta().truncated);
    }

    #[tokio::test]
    async fn test_deprecation_notice() {
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "old_find", json!({}), CallOptions::new()).await;
        assert!(outcome.envelope.is_ok());
        assert_eq!(outcome.context.notices.len(), 1);
        assert!(outcome.context.notices[0].contains("find_files"));
    }

    #[tokio::test]
    async fn test_session_and_format_defaults() {
        let (_, dispatcher) = setup();
        let config = RuntimeConfig {
            format: Some(OutputFormat::Jsonl),
            session_id: Some("ses_abc".to_string()),
            ..RuntimeConfig::default()
        };
        let dispatcher = Dispatcher::from_config(Arc::clone(dispatcher.registry()), &config).unwrap();
        let outcome = call(&dispatcher, "find_files", json!({"pattern": "x"}), CallOptions::new()).await;
        assert_eq!(outcome.envelope.meta().session_id.as_deref(), Some("ses_abc"));
        assert_eq!(outcome.render().format, OutputFormat::Jsonl);
    }

    #[tokio::test]
    async fn test_in_process_caller_is_structured() {
        let (_, dispatcher) = setup();
        let caller = CallerInfo::new(CallerCategory::InProcess, 1.0, Signal::InProcess);
        let outcome = dispatcher
            .call_as("find_files", json!({"pattern": "x"}), caller, CallOptions::new())
            .await;
        assert!(outcome.context.is_structured());
        assert_eq!(outcome.envelope.meta().caller_id, None);
    }

    #[tokio::test]
    async fn test_call_uses_shared_caller_cache() {
        let (_, dispatcher) = setup();
        let cache = Arc::new(CallerCache::new());
        let cached = cache
            .get_or_detect_in_process(&CallerDetector::new(
                StaticProbe::new().with_var(ENV_CALLER, "agent:cached-agent"),
            ))
            .clone();
        assert_eq!(cached.category, CallerCategory::Agent);

        let dispatcher = dispatcher.with_caller_cache(Arc::clone(&cache));
        for _ in 0..2 {
            let outcome = dispatcher
                .call("find_files", json!({"pattern": "x"}), CallOptions::new())
                .await;
            assert_eq!(outcome.context.caller, cached);
            assert_eq!(outcome.envelope.meta().caller_id.as_deref(), Some("cached-agent"));
        }
    }

    #[tokio::test]
    async fn test_body_runs_inside_dispatch_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let (_, dispatcher) = setup();
        let outcome = call(&dispatcher, "span_name", json!({}), CallOptions::new()).await;
        assert_eq!(outcome.envelope.result(), Some(&json!("dispatch")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_independent() {
        let (fs, dispatcher) = setup();
        let dispatcher = Arc::new(dispatcher);
        let mut handles = Vec::new();
        for i in 0..32 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                let (args, options) = if i % 2 == 0 {
                    (json!({"path": format!("f{i}"), "body": "x"}), CallOptions::new().yes(true))
                } else {
                    (json!({"path": format!("f{i}"), "body": "x"}), CallOptions::new().dry_run(true))
                };
                let outcome = dispatcher.call_as("write_file", args, agent(), options).await;
                (i, outcome)
            }));
        }
        for handle in handles {
            let (i, outcome) = handle.await.unwrap();
            assert!(outcome.envelope.is_ok());
            assert_eq!(outcome.envelope.meta().dry_run, i % 2 == 1);
        }
        assert_eq!(fs.writes(), 16);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn prop_exactly_one_of_result_or_error(
                command in prop::sample::select(vec![
                    "find_files", "write_file", "lookup", "sneaky", "io_fail", "flaky", "many", "nope",
                ]),
                pattern in prop::option::of("[a-z*.]{0,6}"),
                dry_run in any::<bool>(),
                yes in any::<bool>(),
            ) {
                let (_, dispatcher) = setup();
                let mut args = serde_json::Map::new();
                if let Some(p) = pattern {
                    args.insert("pattern".to_string(), json!(p));
                    args.insert("path".to_string(), json!(p));
                }
                let options = CallOptions::new().dry_run(dry_run).yes(yes);
                let outcome = runtime().block_on(call(&dispatcher, command, Value::Object(args), options));
                let wire: Value = serde_json::from_str(&outcome.envelope.to_json_line().unwrap()).unwrap();
                prop_assert!(wire.get("result").is_some() != wire.get("error").is_some());
                prop_assert_eq!(wire["ok"].as_bool(), Some(wire.get("result").is_some()));
                if let Some(err) = outcome.envelope.error() {
                    if matches!(err.category, ErrorCategory::Auth | ErrorCategory::Internal) {
                        prop_assert!(!err.is_retryable());
                    }
                    if !matches!(err.category, ErrorCategory::Input | ErrorCategory::State) {
                        prop_assert!(!err.suggestion.as_ref().is_some_and(|s| s.retry));
                    }
                }
            }
        }
    }
}
