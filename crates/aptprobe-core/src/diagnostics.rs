use tracing::{debug, warn};

/// Last-error slot plus the verbose trace toggle.
///
/// The slot holds a single message: every recorded error overwrites the
/// previous one. It is diagnostic text for humans, never a control-flow
/// signal; callers get structured errors from the `Result` of each
/// operation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    last_error: Option<String>,
    trace_enabled: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    /// Emit a step trace when tracing is switched on.
    pub fn trace(&self, step: &str) {
        if self.trace_enabled {
            debug!(target: "aptprobe::trace", "{}", step);
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.last_error = Some(message);
    }

    /// Most recent error message, or the empty string.
    pub fn last_error(&self) -> &str {
        self.last_error.as_deref().unwrap_or("")
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}
