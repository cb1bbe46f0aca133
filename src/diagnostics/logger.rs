use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;

use super::events::DiagnosticEvent;
use super::interception::CommandInterceptor;
use super::sink::DiagnosticSink;

struct LoggerInner {
    sink: Option<Arc<dyn DiagnosticSink>>,
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    sensitive_data_logging: bool,
    sensitive_warning_logged: AtomicBool,
}

/// Dispatches diagnostic events to `tracing` and the optional structured sink, and carries
/// the command interceptors.
///
/// Cloning is cheap and clones share the one-time sensitive data warning.
#[derive(Clone)]
pub struct DiagnosticsLogger {
    inner: Arc<LoggerInner>,
}

impl DiagnosticsLogger {
    #[must_use]
    pub fn new(sink: Option<Arc<dyn DiagnosticSink>>, sensitive_data_logging: bool) -> Self {
        Self::with_interceptors(sink, sensitive_data_logging, Vec::new())
    }

    #[must_use]
    pub fn with_interceptors(
        sink: Option<Arc<dyn DiagnosticSink>>,
        sensitive_data_logging: bool,
        interceptors: Vec<Arc<dyn CommandInterceptor>>,
    ) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                sink,
                interceptors,
                sensitive_data_logging,
                sensitive_warning_logged: AtomicBool::new(false),
            }),
        }
    }

    /// A logger with no sink that never renders parameter values.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    #[must_use]
    pub fn sensitive_data_logging(&self) -> bool {
        self.inner.sensitive_data_logging
    }

    #[must_use]
    pub fn interceptors(&self) -> &[Arc<dyn CommandInterceptor>] {
        &self.inner.interceptors
    }

    pub fn emit(&self, event: DiagnosticEvent) {
        if self.inner.sensitive_data_logging
            && matches!(event, DiagnosticEvent::CommandExecuting(_))
            && !self.inner.sensitive_warning_logged.swap(true, Ordering::SeqCst)
        {
            self.dispatch(&DiagnosticEvent::SensitiveDataLoggingEnabled);
        }
        self.dispatch(&event);
    }

    fn dispatch(&self, event: &DiagnosticEvent) {
        let level = event.level();
        let message = event.message(self.inner.sensitive_data_logging);
        let event_id = event.event_id().name();
        if level == Level::ERROR {
            tracing::error!(event_id, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(event_id, "{message}");
        } else if level == Level::INFO {
            tracing::info!(event_id, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(event_id, "{message}");
        } else {
            tracing::trace!(event_id, "{message}");
        }
        if let Some(sink) = &self.inner.sink {
            sink.emit(event);
        }
    }
}

impl Default for DiagnosticsLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for DiagnosticsLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsLogger")
            .field("has_sink", &self.inner.sink.is_some())
            .field("interceptors", &self.inner.interceptors.len())
            .field("sensitive_data_logging", &self.inner.sensitive_data_logging)
            .finish()
    }
}
