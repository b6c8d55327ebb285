//! Per-call execution context and call options.

use crate::router::OutputFormat;
use std::time::Duration;
use triform_context::CallerInfo;
use triform_core::SessionId;

/// Options a caller passes with one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Run only the preview path
    pub dry_run: bool,
    /// Confirm a destructive command
    pub yes: bool,
    /// Output format override
    pub format: Option<OutputFormat>,
    /// Deadline for the command body; falls back to the dispatcher default
    pub timeout: Option<Duration>,
    /// Session to echo in `meta.session_id`
    pub session_id: Option<SessionId>,
}

impl CallOptions {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a dry run
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Confirm destructive execution
    #[must_use]
    pub fn yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    /// Override the output format
    #[must_use]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set a deadline
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a session
    #[must_use]
    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// State for exactly one call; never shared between calls
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// Detected caller
    pub caller: CallerInfo,
    /// Session id, when known
    pub session_id: Option<SessionId>,
    /// Dry run requested
    pub dry_run: bool,
    /// Destructive execution confirmed
    pub confirmed: bool,
    /// Explicit output format, if any
    pub format: Option<OutputFormat>,
    /// Effective deadline
    pub deadline: Option<Duration>,
    /// Human-facing notices, such as deprecation warnings
    pub notices: Vec<String>,
}

impl ExecutionContext {
    /// Context with no options set
    #[must_use]
    pub fn new(caller: CallerInfo) -> Self {
        Self {
            caller,
            session_id: None,
            dry_run: false,
            confirmed: false,
            format: None,
            deadline: None,
            notices: Vec::new(),
        }
    }

    /// Context for a call with the given options
    #[must_use]
    pub fn for_call(caller: CallerInfo, options: CallOptions) -> Self {
        Self {
            caller,
            session_id: options.session_id,
            dry_run: options.dry_run,
            confirmed: options.yes,
            format: options.format,
            deadline: options.timeout,
            notices: Vec::new(),
        }
    }

    /// Confidence of the caller classification
    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.caller.confidence
    }

    /// Whether output will be structured
    #[must_use]
    pub fn is_structured(&self) -> bool {
        crate::router::choose_format(self).is_structured()
    }
}
