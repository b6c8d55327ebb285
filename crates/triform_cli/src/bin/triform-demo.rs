//! triform demo
//!
//! A small file toolbox exposing the same commands to people, scripts and
//! agents.

#![warn(clippy::all)]

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use regex::Regex;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use triform_cli::{App, init_logging};
use triform_context::CallerCache;
use triform_core::{ErrorCode, Suggestion, ToolError, Version};
use triform_tool::{
    AppInfo, Arguments, CommandOutput, CommandRegistry, CommandSpec, FnHandler, ParameterSpec,
    TypeSpec,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_logging();

    let registry = Arc::new(registry().wrap_err("failed to register demo commands")?);
    let cache = Arc::new(CallerCache::new());
    let app = App::load(registry, None)
        .wrap_err("failed to load configuration")?
        .with_cache(cache);
    let output = app.run(std::env::args().skip(1)).await;
    output.emit().wrap_err("failed to write output")?;
    Ok(output.status())
}

fn registry() -> Result<CommandRegistry> {
    let version = Version::parse(env!("CARGO_PKG_VERSION"))
        .map_err(|err| color_eyre::eyre::eyre!("bad package version: {err}"))?;
    let mut registry = CommandRegistry::new(AppInfo::new("triform-demo", version));

    registry.register(
        CommandSpec::new("find_files")
            .describe("Find files whose name matches a glob")
            .param(ParameterSpec::required("pattern", TypeSpec::String).help("Glob such as *.rs"))
            .param(
                ParameterSpec::optional("root", TypeSpec::String, Some(json!(".")))
                    .help("Directory to search"),
            )
            .param(
                ParameterSpec::optional("max_depth", TypeSpec::Integer, Some(json!(8)))
                    .min(0.0)
                    .max(64.0)
                    .help("Levels below root to descend"),
            )
            .param(
                ParameterSpec::optional("hidden", TypeSpec::Boolean, Some(json!(false)))
                    .help("Include dot files and directories"),
            )
            .returns_expr("list[string]")
            .requires("fs:read")
            .read_only()
            .idempotent()
            .suggest(
                ErrorCode::NotFound,
                Suggestion::new("check_root", "check that '{field}' names an existing directory")
                    .with_example("triform-demo {command} --root ."),
            ),
        FnHandler::blocking(find_files),
    )?;

    registry.register(
        CommandSpec::new("write_file")
            .describe("Write text to a file")
            .param(ParameterSpec::required("path", TypeSpec::String).min_length(1))
            .param(ParameterSpec::required("content", TypeSpec::String))
            .param(
                ParameterSpec::optional("append", TypeSpec::Boolean, Some(json!(false)))
                    .help("Append instead of replacing"),
            )
            .returns_expr("object")
            .requires("fs:write")
            .destructive(),
        FnHandler::blocking(write_file).with_blocking_preview(preview_write),
    )?;

    registry.register(
        CommandSpec::new("sleep")
            .describe("Wait, then report how long")
            .param(
                ParameterSpec::required("seconds", TypeSpec::Float)
                    .min(0.0)
                    .max(3600.0),
            )
            .returns_expr("float")
            .read_only(),
        FnHandler::new(|args: Arguments| async move {
            let seconds: f64 = args.get("seconds")?;
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok(json!(seconds))
        }),
    )?;

    Ok(registry)
}

fn glob(pattern: &str) -> Result<Regex, ToolError> {
    let translated = regex::escape(pattern)
        .replace(r"\*", "[^/]*")
        .replace(r"\?", "[^/]");
    Regex::new(&format!("^{translated}$"))
        .map_err(|err| ToolError::constraint("pattern", err))
}

fn find_files(args: Arguments) -> CommandOutput {
    let pattern = glob(args.str("pattern")?)?;
    let root = PathBuf::from(args.str("root")?);
    let max_depth: usize = args.get("max_depth")?;
    let hidden = args.flag("hidden");

    if !root.is_dir() {
        return Err(ToolError::not_found("directory", &root.display().to_string())
            .with_field("root")
            .into());
    }

    let mut found = Vec::new();
    walk(&root, 0, max_depth, hidden, &pattern, &mut found).map_err(|err| {
        ToolError::execution_failed(format!("searching '{}' failed: {err}", root.display()))
    })?;
    found.sort();
    Ok(json!(found))
}

fn walk(
    dir: &Path,
    depth: usize,
    max_depth: usize,
    hidden: bool,
    pattern: &Regex,
    found: &mut Vec<String>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !hidden && name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let kind = entry.file_type()?;
        if kind.is_dir() {
            if depth < max_depth {
                walk(&path, depth + 1, max_depth, hidden, pattern, found)?;
            }
        } else if pattern.is_match(&name) {
            found.push(path.display().to_string());
        }
    }
    Ok(())
}

fn write_file(args: Arguments) -> CommandOutput {
    let path = args.str("path")?;
    let content = args.str("content")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(args.flag("append"))
        .truncate(!args.flag("append"))
        .open(path)
        .map_err(|err| io_error(path, &err))?;
    file.write_all(content.as_bytes())
        .map_err(|err| io_error(path, &err))?;
    Ok(json!({ "path": path, "bytes": content.len() }))
}

fn preview_write(args: Arguments) -> CommandOutput {
    let path = args.str("path")?;
    let exists = Path::new(path).exists();
    Ok(json!({
        "path": path,
        "bytes": args.str("content")?.len(),
        "exists": exists,
        "action": match (exists, args.flag("append")) {
            (true, true) => "append",
            (true, false) => "overwrite",
            (false, _) => "create",
        },
    }))
}

fn io_error(path: &str, err: &std::io::Error) -> ToolError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ToolError::not_found("path", path).with_field("path"),
        std::io::ErrorKind::PermissionDenied => {
            ToolError::permission_denied(format!("cannot write '{path}'")).with_field("path")
        }
        _ => ToolError::execution_failed(format!("writing '{path}' failed: {err}"))
            .with_retryable(true),
    }
}
