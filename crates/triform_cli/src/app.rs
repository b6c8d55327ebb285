//! The CLI runner.

use crate::flags::{GlobalFlags, split_args};
use console::style;
use serde_json::{Value, json};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use triform_context::{CallerCache, CallerDetector, CallerInfo};
use triform_core::{EnvelopeBuilder, ToolError};
use triform_runtime::{
    CallOptions, ConfigError, Dispatcher, ExecutionContext, OutputFormat, RuntimeConfig,
    choose_format, route,
};
use triform_tool::{
    CommandMeta, CommandRegistry, RawInput, command_schema, export_schema, to_canonical_string,
};

/// Text and exit code produced by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOutput {
    /// Text for stdout
    pub stdout: String,
    /// Text for stderr
    pub stderr: String,
    /// Process exit code
    pub exit_code: i32,
}

impl AppOutput {
    fn ok(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Write both streams
    ///
    /// # Errors
    ///
    /// Returns error if either stream cannot be written
    pub fn emit(&self) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.stdout.as_bytes())?;
        stdout.flush()?;
        let mut stderr = io::stderr().lock();
        stderr.write_all(self.stderr.as_bytes())?;
        stderr.flush()
    }

    /// Exit code as a process status
    #[must_use]
    pub fn status(&self) -> ExitCode {
        ExitCode::from(u8::try_from(self.exit_code).unwrap_or(1))
    }
}

/// Turns a registry into a command-line program
#[derive(Debug, Clone)]
pub struct App {
    registry: Arc<CommandRegistry>,
    config: RuntimeConfig,
    caller: Option<CallerInfo>,
    cache: Arc<CallerCache>,
}

impl App {
    /// App with default configuration
    #[must_use]
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            config: RuntimeConfig::default(),
            caller: None,
            cache: Arc::default(),
        }
    }

    /// App configured from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the configuration cannot be loaded
    pub fn load(registry: Arc<CommandRegistry>, path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = RuntimeConfig::load(path)?;
        Ok(Self::new(registry).with_config(config))
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip detection and use this caller
    #[must_use]
    pub fn with_caller(mut self, caller: CallerInfo) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Share a caller detection cache; every run reuses its answer
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CallerCache>) -> Self {
        self.cache = cache;
        self
    }

    fn caller(&self) -> CallerInfo {
        if let Some(caller) = &self.caller {
            return caller.clone();
        }
        if let Some(caller) = self.config.caller.as_deref().and_then(CallerInfo::from_explicit) {
            return caller;
        }
        self.cache.get_or_detect(&CallerDetector::system()).clone()
    }

    /// Run one command line, program name excluded
    pub async fn run<I, S>(&self, args: I) -> AppOutput
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let split = split_args(args);
        let caller = self.caller();
        let command = split.command.as_deref();

        let flags = match GlobalFlags::parse_tokens(&split.globals) {
            Ok(flags) => flags,
            Err(error) => return self.failure(command, error, caller, None),
        };
        let format = flags.format();

        let config = match &flags.config {
            Some(path) => match RuntimeConfig::load(Some(path.as_path())) {
                Ok(config) => config,
                Err(err) => {
                    let error = ToolError::constraint("config", err);
                    return self.failure(command, error, caller, format);
                }
            },
            None => self.config.clone(),
        };
        let dispatcher = match Dispatcher::from_config(Arc::clone(&self.registry), &config) {
            Ok(dispatcher) => dispatcher.with_caller_cache(Arc::clone(&self.cache)),
            Err(err) => {
                let error = ToolError::constraint("capabilities", err);
                return self.failure(command, error, caller, format);
            }
        };
        let format = format.or(config.format);

        let Some(name) = command else {
            return if flags.schema {
                self.schema_output()
            } else {
                self.listing(caller, format)
            };
        };

        if flags.schema || flags.help {
            if let Some(command) = self.registry.get(name) {
                return if flags.schema {
                    canonical(&command_schema(command.meta()))
                } else {
                    AppOutput::ok(help_table(&self.registry.app().name, command.meta()))
                };
            }
        }

        let mut options = CallOptions::new().dry_run(flags.dry_run).yes(flags.yes);
        if let Some(format) = format {
            options = options.format(format);
        }
        if let Some(timeout) = flags.timeout {
            options = options.timeout(timeout);
        }

        let outcome = dispatcher
            .dispatch(name, RawInput::Tokens(split.rest), caller, options)
            .await;
        let rendered = outcome.render();
        AppOutput {
            stdout: rendered.stdout,
            stderr: rendered.stderr,
            exit_code: outcome.exit_code(),
        }
    }

    fn failure(
        &self,
        command: Option<&str>,
        error: ToolError,
        caller: CallerInfo,
        format: Option<OutputFormat>,
    ) -> AppOutput {
        let app = self.registry.app();
        let envelope = EnvelopeBuilder::new(command.unwrap_or(&app.name), app.version.to_string())
            .caller_id(caller.caller_id())
            .failure(error);
        let mut ctx = ExecutionContext::new(caller);
        ctx.format = format;
        let rendered = route(&envelope, &ctx);
        AppOutput {
            stdout: rendered.stdout,
            stderr: rendered.stderr,
            exit_code: envelope.exit_code(),
        }
    }

    fn schema_output(&self) -> AppOutput {
        match export_schema(&self.registry).and_then(|export| export.to_canonical_string()) {
            Ok(mut text) => {
                text.push('\n');
                AppOutput::ok(text)
            }
            Err(err) => internal(&err),
        }
    }

    fn listing(&self, caller: CallerInfo, format: Option<OutputFormat>) -> AppOutput {
        let mut ctx = ExecutionContext::new(caller);
        ctx.format = format;
        let app = self.registry.app();

        let format = choose_format(&ctx);
        if format.is_structured() {
            let commands: Vec<Value> = self
                .registry
                .list()
                .map(|meta| {
                    json!({
                        "name": meta.name,
                        "description": meta.description,
                        "deprecated": meta.deprecation.is_some(),
                    })
                })
                .collect();
            let listing = json!({
                "app": app.name,
                "version": app.version.to_string(),
                "commands": commands,
            });
            let rendered = match format {
                OutputFormat::Jsonl => serde_json::to_string(&listing),
                _ => serde_json::to_string_pretty(&listing),
            };
            return match rendered {
                Ok(mut text) => {
                    text.push('\n');
                    AppOutput::ok(text)
                }
                Err(err) => internal(&err),
            };
        }

        let mut out = format!(
            "{} {}\n\n{}\n",
            style(&app.name).bold(),
            app.version,
            style("Commands:").bold()
        );
        let width = self.registry.list().map(|m| m.name.len()).max().unwrap_or(0);
        for meta in self.registry.list() {
            let mut line = format!("  {:<width$}  {}", meta.name, meta.description);
            if meta.deprecation.is_some() {
                line.push_str(&format!(" {}", style("(deprecated)").dim()));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out.push_str(&format!(
            "\nRun '{} <command> --help' for a command's parameters.\n",
            app.name
        ));
        AppOutput::ok(out)
    }
}

fn canonical(value: &Value) -> AppOutput {
    match to_canonical_string(value) {
        Ok(mut text) => {
            text.push('\n');
            AppOutput::ok(text)
        }
        Err(err) => internal(&err),
    }
}

fn internal(err: &serde_json::Error) -> AppOutput {
    tracing::error!(error = %err, "schema serialization failed");
    let error = ToolError::internal();
    AppOutput {
        stdout: String::new(),
        stderr: format!("error[{}]: {}\n", error.code, error.message),
        exit_code: error.exit_code(),
    }
}

/// Usage line and parameter table for one command
#[must_use]
pub fn help_table(app: &str, meta: &CommandMeta) -> String {
    let mut usage = format!("{app} {}", meta.name);
    for param in meta.params.iter().filter(|p| p.required) {
        usage.push_str(&format!(" <{}>", param.name));
    }
    if meta.params.iter().any(|p| !p.required) {
        usage.push_str(" [OPTIONS]");
    }

    let mut out = format!("{}\n\n{} {usage}\n", meta.description, style("Usage:").bold());
    if let Some(deprecation) = &meta.deprecation {
        out.push_str(&format!(
            "\n{} since {}: {}\n",
            style("Deprecated").yellow().bold(),
            deprecation.since,
            deprecation.message
        ));
    }

    if !meta.params.is_empty() {
        let rows: Vec<(String, String, String)> = meta
            .params
            .iter()
            .map(|param| {
                let flag = if param.ty.unwrapped().is_boolean() {
                    format!("{} / --no-{}", param.flag(), &param.flag()[2..])
                } else {
                    format!("{} <{}>", param.flag(), param.ty.label())
                };
                let status = match (&param.default, param.required) {
                    (_, true) => "required".to_string(),
                    (Some(default), false) => format!("default: {default}"),
                    (None, false) => "optional".to_string(),
                };
                (flag, status, param.help.clone().unwrap_or_default())
            })
            .collect();
        let flag_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
        let status_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);

        out.push_str(&format!("\n{}\n", style("Arguments:").bold()));
        for (flag, status, help) in rows {
            let line = format!("  {flag:<flag_width$}  {status:<status_width$}  {help}");
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    if !meta.capabilities.is_empty() {
        let caps: Vec<String> = meta.capabilities.iter().map(ToString::to_string).collect();
        out.push_str(&format!("\n{} {}\n", style("Requires:").bold(), caps.join(", ")));
    }

    out.push_str(&format!(
        "\n{} --json | --jsonl | --plain, --dry-run, --schema, --timeout <SECONDS>, --yes\n",
        style("Global:").bold()
    ));
    out
}
