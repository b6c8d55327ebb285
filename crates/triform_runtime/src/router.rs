//! Output router: structured envelope for machines, formatted text for people.
//!
//! | Condition | Format |
//! |-----------|--------|
//! | explicit override | that format |
//! | agent, CI, in-process caller | `json` |
//! | human caller | `plain` |
//! | anything else | `plain` on a terminal, `json` otherwise |
//!
//! Structured output is the wire contract and is byte-stable. The plain
//! format is for people and may change between releases.

use crate::context::ExecutionContext;
use console::style;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use triform_context::CallerCategory;
use triform_core::{Envelope, ToolError};

/// Rendering format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed envelope
    Json,
    /// Envelope on one line
    Jsonl,
    /// Human-formatted text
    Plain,
}

impl OutputFormat {
    /// Whether this is a structured (contract-stable) format
    #[must_use]
    pub const fn is_structured(self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            "plain" | "text" | "human" => Ok(Self::Plain),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Rendered output, split by stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    /// Format used
    pub format: OutputFormat,
    /// Text for stdout, newline terminated
    pub stdout: String,
    /// Text for stderr, newline terminated; may be empty
    pub stderr: String,
}

/// Pick the format for a call
#[must_use]
pub fn choose_format(ctx: &ExecutionContext) -> OutputFormat {
    if let Some(format) = ctx.format {
        return format;
    }
    let caller = &ctx.caller;
    if caller.category.is_machine() {
        OutputFormat::Json
    } else if caller.category == CallerCategory::Human || caller.interactive {
        OutputFormat::Plain
    } else {
        OutputFormat::Json
    }
}

/// Render an envelope for the caller in `ctx`
#[must_use]
pub fn route(envelope: &Envelope, ctx: &ExecutionContext) -> RenderedOutput {
    let format = choose_format(ctx);
    match format {
        OutputFormat::Json => structured(format, envelope.to_json_pretty()),
        OutputFormat::Jsonl => structured(format, envelope.to_json_line()),
        OutputFormat::Plain => human(envelope, ctx),
    }
}

fn structured(format: OutputFormat, rendered: serde_json::Result<String>) -> RenderedOutput {
    // stdout must stay parseable even if serialization fails
    let mut stdout = rendered.unwrap_or_else(|err| {
        tracing::error!(error = %err, "envelope serialization failed");
        r#"{"ok":false,"error":{"code":"E5001","category":"internal","message":"internal error while rendering the result","is_retryable":false},"meta":{"tool":"","version":"","duration_ms":0}}"#.to_string()
    });
    stdout.push('\n');
    RenderedOutput {
        format,
        stdout,
        stderr: String::new(),
    }
}

fn human(envelope: &Envelope, ctx: &ExecutionContext) -> RenderedOutput {
    let mut stdout = String::new();
    let mut stderr = String::new();

    for notice in &ctx.notices {
        stderr.push_str(&format!("{} {notice}\n", style("warning:").yellow().bold()));
    }
    if envelope.meta().dry_run {
        stderr.push_str(&format!("{}\n", style("dry run: nothing was changed").dim()));
    }

    if let Some(result) = envelope.result() {
        render_value(result, &mut stdout);
        if envelope.meta().truncated {
            stderr.push_str(&format!("{}\n", style("(output truncated)").dim()));
        }
    }
    if let Some(error) = envelope.error() {
        render_error(error, &mut stderr);
    }

    RenderedOutput {
        format: OutputFormat::Plain,
        stdout,
        stderr,
    }
}

fn render_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            for item in items {
                out.push_str(&scalar(item));
                out.push('\n');
            }
        }
        Value::Object(map) if map.values().all(is_scalar) => {
            let width = map.keys().map(String::len).max().unwrap_or(0);
            for (key, item) in map {
                out.push_str(&format!("{:<width$}  {}\n", style(key).bold(), scalar(item)));
            }
        }
        other => {
            out.push_str(&serde_json::to_string_pretty(other).unwrap_or_default());
            out.push('\n');
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_error(error: &ToolError, out: &mut String) {
    out.push_str(&format!(
        "{} {}\n",
        style(format!("error[{}]:", error.code)).red().bold(),
        error.message
    ));
    if let Some(field) = &error.field {
        out.push_str(&format!("  field: {field}\n"));
    }
    if let Some(suggestion) = &error.suggestion {
        out.push_str(&format!("  {} {}\n", style("hint:").cyan(), suggestion.fix));
        if let Some(example) = &suggestion.example {
            out.push_str(&format!("  {} {example}\n", style("try:").cyan()));
        }
    }
}
