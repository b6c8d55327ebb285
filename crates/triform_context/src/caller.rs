//! Caller classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who invoked the command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerCategory {
    /// Person at an interactive terminal
    Human,
    /// AI coding agent
    Agent,
    /// Continuous integration job
    Ci,
    /// Container or sandbox with no better signal
    Container,
    /// Direct call from the embedding program
    InProcess,
    /// Non-interactive caller of unknown kind
    Unknown,
}

impl CallerCategory {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::Ci => "ci",
            Self::Container => "container",
            Self::InProcess => "in_process",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the category implies a machine consumer
    #[must_use]
    pub const fn is_machine(self) -> bool {
        matches!(self, Self::Agent | Self::Ci | Self::InProcess)
    }
}

impl fmt::Display for CallerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallerCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "user" => Ok(Self::Human),
            "agent" | "ai" => Ok(Self::Agent),
            "ci" => Ok(Self::Ci),
            "container" => Ok(Self::Container),
            "in_process" | "in-process" | "inprocess" => Ok(Self::InProcess),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

/// Which detection step produced the classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// Explicit identity variable
    Explicit {
        /// Raw value
        value: String,
    },
    /// Known automation environment variable
    Environment {
        /// Variable name
        var: String,
    },
    /// Known launcher in the parent process chain
    Ancestry {
        /// Matched process name
        process: String,
        /// 1 for the direct parent
        depth: usize,
    },
    /// Container marker file or variable
    Container {
        /// Marker that matched
        marker: String,
    },
    /// TTY-ness of stdout
    Terminal {
        /// Whether stdout is a terminal
        interactive: bool,
    },
    /// Direct call from the embedding program
    InProcess,
}

/// Result of caller detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Category
    pub category: CallerCategory,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Specific identity, e.g. `claude-code` or `github-actions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Winning signal
    pub signal: Signal,
    /// Whether stdout is an interactive terminal
    pub interactive: bool,
}

impl CallerInfo {
    /// Create caller info
    #[must_use]
    pub fn new(category: CallerCategory, confidence: f32, signal: Signal) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            name: None,
            signal,
            interactive: false,
        }
    }

    /// Set identity
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set interactivity
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// In-process caller
    #[must_use]
    pub fn in_process() -> Self {
        Self::new(CallerCategory::InProcess, 1.0, Signal::InProcess)
    }

    /// Parse the explicit identity variable.
    ///
    /// Accepts `category`, `category:name`, or a bare name, which is taken to
    /// be an agent (`claude-code`, `my-bot`). Blank values are ignored.
    #[must_use]
    pub fn from_explicit(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        let signal = Signal::Explicit {
            value: value.to_string(),
        };
        let (head, tail) = match value.split_once(':') {
            Some((head, tail)) => (head, Some(tail.trim()).filter(|t| !t.is_empty())),
            None => (value, None),
        };
        let info = match head.parse::<CallerCategory>() {
            Ok(category) => {
                let info = Self::new(category, 1.0, signal);
                match tail {
                    Some(name) => info.with_name(name),
                    None => info,
                }
            }
            Err(()) => Self::new(CallerCategory::Agent, 1.0, signal).with_name(value),
        };
        Some(info)
    }

    /// Identity echoed in `meta.caller_id`, when one is known
    #[must_use]
    pub fn caller_id(&self) -> Option<String> {
        self.name.clone()
    }

    /// Whether the explicit identity variable decided this classification
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        matches!(self.signal, Signal::Explicit { .. })
    }
}
