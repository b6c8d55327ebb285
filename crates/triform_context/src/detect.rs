//! Caller detection and its process-lifetime cache.
//!
//! Resolution order:
//!
//! 1. `TRIFORM_CALLER` (confidence 1.0, short-circuits everything else)
//! 2. Known automation environment variables (0.85 to 0.95)
//! 3. Known launchers in the parent process chain (0.7 to 0.9)
//! 4. Container markers (0.9)
//! 5. TTY of stdout: human 0.6, otherwise unknown 0.5
//!
//! The highest confidence wins; on a tie the earlier step wins.

use crate::caller::{CallerCategory, CallerInfo, Signal};
use crate::probe::{ProcessProbe, SystemProbe};
use std::path::Path;
use std::sync::OnceLock;
use triform_core::ENV_CALLER;

/// (variable, identity, confidence)
const AGENT_VARS: &[(&str, &str, f32)] = &[
    ("CLAUDECODE", "claude-code", 0.95),
    ("CURSOR_AGENT", "cursor", 0.95),
    ("CODEX_SANDBOX", "codex", 0.9),
    ("GEMINI_CLI", "gemini-cli", 0.9),
    ("AIDER_MODEL", "aider", 0.85),
];

const CI_VARS: &[(&str, &str, f32)] = &[
    ("GITHUB_ACTIONS", "github-actions", 0.95),
    ("GITLAB_CI", "gitlab-ci", 0.95),
    ("BUILDKITE", "buildkite", 0.95),
    ("CIRCLECI", "circleci", 0.95),
    ("JENKINS_URL", "jenkins", 0.9),
    ("TF_BUILD", "azure-pipelines", 0.9),
    ("CI", "ci", 0.85),
];

/// (process name, category, identity, confidence at depth 1)
const LAUNCHERS: &[(&str, CallerCategory, &str, f32)] = &[
    ("claude", CallerCategory::Agent, "claude-code", 0.9),
    ("cursor-agent", CallerCategory::Agent, "cursor", 0.9),
    ("codex", CallerCategory::Agent, "codex", 0.9),
    ("gemini", CallerCategory::Agent, "gemini-cli", 0.85),
    ("aider", CallerCategory::Agent, "aider", 0.85),
    ("runner.worker", CallerCategory::Ci, "github-actions", 0.85),
    ("gitlab-runner", CallerCategory::Ci, "gitlab-ci", 0.85),
    ("buildkite-agent", CallerCategory::Ci, "buildkite", 0.85),
];

const CONTAINER_FILES: &[&str] = &["/.dockerenv", "/run/.containerenv"];
const CONTAINER_CONFIDENCE: f32 = 0.9;

const ANCESTRY_DECAY: f32 = 0.05;
const ANCESTRY_FLOOR: f32 = 0.7;
const DEFAULT_MAX_DEPTH: usize = 8;

/// Caller detector over a [`ProcessProbe`]
#[derive(Debug, Clone)]
pub struct CallerDetector<P = SystemProbe> {
    probe: P,
    max_depth: usize,
}

impl CallerDetector<SystemProbe> {
    /// Detector for the current process
    #[must_use]
    pub fn system() -> Self {
        Self::new(SystemProbe)
    }
}

impl<P: ProcessProbe> CallerDetector<P> {
    /// Detector over a probe
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit how far up the process tree to look
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Classification from the explicit identity variable alone
    #[must_use]
    pub fn explicit(&self) -> Option<CallerInfo> {
        let raw = self.probe.var(ENV_CALLER)?;
        CallerInfo::from_explicit(&raw)
            .map(|info| info.with_interactive(self.probe.stdout_is_terminal()))
    }

    /// Classification for a direct in-process call: the explicit variable if
    /// set, otherwise `in_process`
    #[must_use]
    pub fn detect_in_process(&self) -> CallerInfo {
        self.explicit().unwrap_or_else(CallerInfo::in_process)
    }

    /// Run the full resolution order
    #[must_use]
    pub fn detect(&self) -> CallerInfo {
        if let Some(info) = self.explicit() {
            tracing::debug!(category = %info.category, "caller from explicit identity");
            return info;
        }

        let interactive = self.probe.stdout_is_terminal();
        let candidates = self
            .from_environment()
            .into_iter()
            .chain(self.from_ancestry())
            .chain(self.from_container())
            .chain(std::iter::once(Self::from_terminal(interactive)));

        let mut best: Option<CallerInfo> = None;
        for candidate in candidates {
            if best
                .as_ref()
                .is_none_or(|b| candidate.confidence > b.confidence)
            {
                best = Some(candidate);
            }
        }
        let info = best
            .unwrap_or_else(|| Self::from_terminal(interactive))
            .with_interactive(interactive);
        tracing::debug!(
            category = %info.category,
            confidence = info.confidence,
            signal = ?info.signal,
            "caller detected"
        );
        info
    }

    fn var_is_set(&self, key: &str) -> bool {
        self.probe.var(key).is_some_and(|v| {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        })
    }

    fn from_environment(&self) -> Option<CallerInfo> {
        let agents = AGENT_VARS.iter().map(|e| (CallerCategory::Agent, e));
        let ci = CI_VARS.iter().map(|e| (CallerCategory::Ci, e));
        agents
            .chain(ci)
            .find(|(_, (var, _, _))| self.var_is_set(var))
            .map(|(category, (var, name, confidence))| {
                CallerInfo::new(
                    category,
                    *confidence,
                    Signal::Environment {
                        var: (*var).to_string(),
                    },
                )
                .with_name(*name)
            })
    }

    fn from_ancestry(&self) -> Option<CallerInfo> {
        for (index, entry) in self.probe.ancestors(self.max_depth).iter().enumerate() {
            let names = entry.candidate_names();
            let hit = LAUNCHERS
                .iter()
                .find(|(process, ..)| names.iter().any(|n| n == process));
            if let Some((process, category, name, base)) = hit {
                let depth = index + 1;
                let confidence = (base - ANCESTRY_DECAY * index as f32).max(ANCESTRY_FLOOR);
                return Some(
                    CallerInfo::new(
                        *category,
                        confidence,
                        Signal::Ancestry {
                            process: (*process).to_string(),
                            depth,
                        },
                    )
                    .with_name(*name),
                );
            }
        }
        None
    }

    fn from_container(&self) -> Option<CallerInfo> {
        let file = CONTAINER_FILES
            .iter()
            .find(|path| self.probe.path_exists(Path::new(path)))
            .map(|path| (*path).to_string());
        let marker = file.or_else(|| {
            ["container", "KUBERNETES_SERVICE_HOST"]
                .into_iter()
                .find(|var| self.var_is_set(var))
                .map(|var| format!("${var}"))
        })?;
        Some(CallerInfo::new(
            CallerCategory::Container,
            CONTAINER_CONFIDENCE,
            Signal::Container { marker },
        ))
    }

    fn from_terminal(interactive: bool) -> CallerInfo {
        let signal = Signal::Terminal { interactive };
        if interactive {
            CallerInfo::new(CallerCategory::Human, 0.6, signal)
        } else {
            CallerInfo::new(CallerCategory::Unknown, 0.5, signal)
        }
    }
}

/// Process-scoped detection cache.
///
/// The application creates one, usually behind an `Arc`, and hands it to
/// the runtime; the first call runs detection, every later call reuses the
/// answer. Full detection and in-process classification are cached
/// separately.
#[derive(Debug, Default)]
pub struct CallerCache {
    cell: OnceLock<CallerInfo>,
    in_process: OnceLock<CallerInfo>,
}

impl CallerCache {
    /// Empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            in_process: OnceLock::new(),
        }
    }

    /// Cached info, detecting on first use
    pub fn get_or_detect<P: ProcessProbe>(&self, detector: &CallerDetector<P>) -> &CallerInfo {
        self.cell.get_or_init(|| detector.detect())
    }

    /// Cached in-process classification, computed on first use
    pub fn get_or_detect_in_process<P: ProcessProbe>(
        &self,
        detector: &CallerDetector<P>,
    ) -> &CallerInfo {
        self.in_process.get_or_init(|| detector.detect_in_process())
    }

    /// Cached info, if detection already ran
    #[must_use]
    pub fn get(&self) -> Option<&CallerInfo> {
        self.cell.get()
    }
}
