//! Global flags shared by every command.
//!
//! Global flags may appear anywhere before `--`; everything else belongs to
//! the command. A command parameter that shares a global flag's spelling is
//! shadowed by the global.

use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use triform_core::ToolError;
use triform_runtime::OutputFormat;

/// Flags the runtime owns
#[derive(Parser, Debug, Default, Clone, PartialEq)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct GlobalFlags {
    /// Pretty-printed JSON envelope
    #[arg(long, conflicts_with_all = ["jsonl", "plain"])]
    pub json: bool,

    /// One-line JSON envelope
    #[arg(long, conflicts_with = "plain")]
    pub jsonl: bool,

    /// Human-formatted output
    #[arg(long)]
    pub plain: bool,

    /// Run only the preview path
    #[arg(long)]
    pub dry_run: bool,

    /// Print the schema instead of running
    #[arg(long)]
    pub schema: bool,

    /// Deadline for the command body, in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Confirm a destructive command
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the command's parameter table
    #[arg(short = 'h', long)]
    pub help: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl GlobalFlags {
    /// Parse the tokens collected by [`split_args`]
    ///
    /// # Errors
    ///
    /// Returns an input error for a malformed value or conflicting formats
    pub fn parse_tokens(tokens: &[String]) -> Result<Self, ToolError> {
        Self::try_parse_from(tokens).map_err(|err| match err.kind() {
            ErrorKind::ArgumentConflict => ToolError::constraint(
                "format",
                "only one of --json, --jsonl and --plain may be given",
            ),
            // --timeout is the only global that validates its value
            ErrorKind::InvalidValue | ErrorKind::ValueValidation => {
                ToolError::invalid_type("timeout", "a positive number of seconds")
            }
            _ => ToolError::constraint("flags", first_line(&err.to_string())),
        })
    }

    /// Format requested on the command line
    #[must_use]
    pub fn format(&self) -> Option<OutputFormat> {
        if self.json {
            Some(OutputFormat::Json)
        } else if self.jsonl {
            Some(OutputFormat::Jsonl)
        } else if self.plain {
            Some(OutputFormat::Plain)
        } else {
            None
        }
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("timeout must be positive, got {raw}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("timeout {raw} is out of range"))
}

fn first_line(message: &str) -> String {
    message
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}

const SWITCHES: &[&str] = &[
    "--json",
    "--jsonl",
    "--plain",
    "--dry-run",
    "--schema",
    "--yes",
    "-y",
    "--help",
    "-h",
];

const VALUED: &[&str] = &["--timeout", "--config"];

/// Command line split into runtime and command parts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitArgs {
    /// Global flag tokens, values included
    pub globals: Vec<String>,
    /// First bare token
    pub command: Option<String>,
    /// Tokens for the command's input adapter
    pub rest: Vec<String>,
}

/// Separate global flags from the command name and its arguments
pub fn split_args<I, S>(args: I) -> SplitArgs
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut split = SplitArgs::default();
    let mut tokens = args.into_iter().map(Into::into);

    while let Some(token) = tokens.next() {
        if token == "--" {
            split.rest.push(token);
            split.rest.extend(tokens.by_ref());
            break;
        }
        if SWITCHES.contains(&token.as_str()) {
            split.globals.push(token);
            continue;
        }
        if VALUED.contains(&token.as_str()) {
            split.globals.push(token);
            if let Some(value) = tokens.next() {
                split.globals.push(value);
            }
            continue;
        }
        let inline_valued = token
            .split_once('=')
            .is_some_and(|(flag, _)| VALUED.contains(&flag));
        if inline_valued {
            split.globals.push(token);
            continue;
        }
        if split.command.is_none() && !token.starts_with('-') {
            split.command = Some(token);
            continue;
        }
        split.rest.push(token);
    }
    split
}
