//! Read-only view of the process environment used by detection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One ancestor process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id
    pub pid: u32,
    /// Short name (`comm`)
    pub name: String,
    /// Command line, arguments separated by spaces
    pub command: String,
}

impl ProcessEntry {
    /// Create an entry
    #[must_use]
    pub fn new(pid: u32, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            command: command.into(),
        }
    }

    /// Executable names this process could be known by: `comm` plus the
    /// basenames of the first two command-line words, so `node .../claude`
    /// still matches `claude`
    #[must_use]
    pub fn candidate_names(&self) -> Vec<String> {
        let mut names = vec![self.name.to_ascii_lowercase()];
        for word in self.command.split_whitespace().take(2) {
            let base = Path::new(word)
                .file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            let base = base.strip_suffix(".js").unwrap_or(base.as_str()).to_string();
            if !base.is_empty() && !names.contains(&base) {
                names.push(base);
            }
        }
        names
    }
}

/// Source of environment facts
pub trait ProcessProbe: Send + Sync {
    /// Environment variable value
    fn var(&self, key: &str) -> Option<String>;

    /// Ancestors, direct parent first, at most `max_depth` entries
    fn ancestors(&self, max_depth: usize) -> Vec<ProcessEntry>;

    /// Whether a marker file exists
    fn path_exists(&self, path: &Path) -> bool;

    /// Whether stdout is an interactive terminal
    fn stdout_is_terminal(&self) -> bool;
}

/// Probe backed by the real process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn ancestors(&self, max_depth: usize) -> Vec<ProcessEntry> {
        proc_ancestors(max_depth)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn stdout_is_terminal(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdout().is_terminal()
    }
}

#[cfg(target_os = "linux")]
fn proc_ancestors(max_depth: usize) -> Vec<ProcessEntry> {
    use std::fs;

    let mut chain = Vec::new();
    let mut pid = parent_of("self");
    while let Some(current) = pid {
        if current <= 1 || chain.len() >= max_depth {
            break;
        }
        let name = fs::read_to_string(format!("/proc/{current}/comm"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        // cmdline is NUL separated
        let command = fs::read(format!("/proc/{current}/cmdline"))
            .map(|raw| {
                String::from_utf8_lossy(&raw)
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        chain.push(ProcessEntry::new(current, name, command));
        pid = parent_of(&current.to_string());
    }
    tracing::trace!(depth = chain.len(), "walked process ancestry");
    chain
}

#[cfg(target_os = "linux")]
fn parent_of(pid: &str) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn proc_ancestors(_max_depth: usize) -> Vec<ProcessEntry> {
    Vec::new()
}

/// Fixed probe for tests and for embedding programs that already know
/// their environment
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    vars: BTreeMap<String, String>,
    ancestors: Vec<ProcessEntry>,
    paths: BTreeSet<PathBuf>,
    terminal: bool,
}

impl StaticProbe {
    /// Empty environment, not a terminal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Append an ancestor (first call is the direct parent)
    #[must_use]
    pub fn with_ancestor(mut self, name: &str, command: &str) -> Self {
        let pid = 1000 + u32::try_from(self.ancestors.len()).unwrap_or(0);
        self.ancestors.push(ProcessEntry::new(pid, name, command));
        self
    }

    /// Mark a path as existing
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    /// Set TTY-ness
    #[must_use]
    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }
}

impl ProcessProbe for StaticProbe {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn ancestors(&self, max_depth: usize) -> Vec<ProcessEntry> {
        self.ancestors.iter().take(max_depth).cloned().collect()
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    fn stdout_is_terminal(&self) -> bool {
        self.terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_names() {
        let entry = ProcessEntry::new(7, "node", "/usr/bin/node /opt/tools/claude.js --resume");
        assert_eq!(entry.candidate_names(), ["node", "claude"]);

        let entry = ProcessEntry::new(8, "bash", "");
        assert_eq!(entry.candidate_names(), ["bash"]);
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::new()
            .with_var("CI", "true")
            .with_ancestor("bash", "bash")
            .with_ancestor("sshd", "sshd")
            .with_path("/.dockerenv")
            .with_terminal(true);
        assert_eq!(probe.var("CI").as_deref(), Some("true"));
        assert_eq!(probe.ancestors(1).len(), 1);
        assert!(probe.path_exists(Path::new("/.dockerenv")));
        assert!(probe.stdout_is_terminal());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_probe_walks_real_ancestry() {
        let chain = SystemProbe.ancestors(4);
        assert!(chain.len() <= 4);
        assert!(chain.iter().all(|entry| entry.pid > 1));
    }
}
