//! Diagnostic sink: operator-facing messages.
//!
//! A diagnostic goes to the structured event log when one is available and,
//! depending on the [`Presentation`], additionally to a modal pop-up
//! (interactive) or standard error (quiet). Background diagnostics, emitted
//! by the running service, go to the event log only.
//!
//! Every diagnostic is also recorded as a `tracing` event.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational.
    Information,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

impl Severity {
    /// Event log entry type (`EVENTLOG_ERROR_TYPE` = 1, warning = 2,
    /// information = 4).
    #[must_use]
    pub const fn event_type(&self) -> u16 {
        match self {
            Self::Error => 0x0001,
            Self::Warning => 0x0002,
            Self::Information => 0x0004,
        }
    }

    /// Pop-up icon for this severity.
    #[must_use]
    pub const fn icon(&self) -> Icon {
        match self {
            Self::Information => Icon::Asterisk,
            Self::Warning => Icon::Exclamation,
            Self::Error => Icon::Stop,
        }
    }

    /// Every severity, as the event log `TypesSupported` mask.
    #[must_use]
    pub const fn supported_types_mask() -> u32 {
        (Self::Error.event_type() | Self::Warning.event_type() | Self::Information.event_type())
            as u32
    }
}

/// Pop-up icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    /// Information icon.
    Asterisk,
    /// Warning icon.
    Exclamation,
    /// Error icon.
    Stop,
}

/// Where, beyond the event log, a diagnostic is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Blocking modal pop-up.
    Interactive,
    /// Standard error.
    Quiet,
    /// Event log only (running as a service, nobody is watching).
    Background,
}

impl Presentation {
    /// Presentation for a command-line operation.
    #[must_use]
    pub const fn for_cli(quiet: bool) -> Self {
        if quiet { Self::Quiet } else { Self::Interactive }
    }
}

/// One operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub message: String,
    /// OS error text appended to the message, if any.
    pub os_error: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            os_error: None,
        }
    }

    /// Informational diagnostic.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Information, message)
    }

    /// Warning diagnostic.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Error diagnostic.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Appends the text of an underlying error.
    #[must_use]
    pub fn with_os_error(mut self, err: impl std::fmt::Display) -> Self {
        self.os_error = Some(err.to_string());
        self
    }

    /// Full text: `message` or `message: os error`.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.os_error {
            Some(os) => format!("{}: {}", self.message, os),
            None => self.message.clone(),
        }
    }
}

/// Destination for operator-facing diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Emits a diagnostic.
    fn emit(&self, diagnostic: &Diagnostic, presentation: Presentation);
}

/// Structured event log backend.
pub trait EventLogWriter: Send + Sync {
    /// Writes one entry attributed to `source`.
    ///
    /// # Errors
    /// Returns the OS error if the entry could not be written.
    fn write(&self, source: &str, severity: Severity, text: &str) -> io::Result<()>;
}

/// Modal pop-up backend.
pub trait PopupPresenter: Send + Sync {
    /// Shows a blocking pop-up.
    fn show(&self, title: &str, text: &str, icon: Icon);
}

/// Routes diagnostics to the event log, a pop-up, or standard error.
pub struct DiagnosticRouter {
    source: String,
    title: Option<String>,
    event_log: Option<Arc<dyn EventLogWriter>>,
    popup: Option<Arc<dyn PopupPresenter>>,
    console: Mutex<Box<dyn Write + Send>>,
}

impl DiagnosticRouter {
    /// Creates a router for `source` that writes to standard error only.
    ///
    /// `source` must be the name the event source was installed under.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: None,
            event_log: None,
            popup: None,
            console: Mutex::new(Box::new(io::stderr())),
        }
    }

    /// Adds an event log backend.
    #[must_use]
    pub fn with_event_log(mut self, writer: Arc<dyn EventLogWriter>) -> Self {
        self.event_log = Some(writer);
        self
    }

    /// Adds a pop-up backend.
    #[must_use]
    pub fn with_popup(mut self, popup: Arc<dyn PopupPresenter>) -> Self {
        self.popup = Some(popup);
        self
    }

    /// Sets the pop-up title. Defaults to the event source name.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Replaces standard error with another writer.
    #[must_use]
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = Mutex::new(console);
        self
    }

    /// Event source name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pop-up title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source)
    }

    fn console_line(&self, line: &str) {
        let mut console = self.console.lock();
        // stderr is the last resort; nothing is left to report a failure to
        let _ = writeln!(console, "{line}");
        let _ = console.flush();
    }
}

impl std::fmt::Debug for DiagnosticRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticRouter")
            .field("source", &self.source)
            .field("title", &self.title)
            .field("event_log", &self.event_log.is_some())
            .field("popup", &self.popup.is_some())
            .finish_non_exhaustive()
    }
}

impl DiagnosticSink for DiagnosticRouter {
    fn emit(&self, diagnostic: &Diagnostic, presentation: Presentation) {
        let text = diagnostic.text();
        match diagnostic.severity {
            Severity::Information => tracing::info!(source = %self.source, "{text}"),
            Severity::Warning => tracing::warn!(source = %self.source, "{text}"),
            Severity::Error => tracing::error!(source = %self.source, "{text}"),
        }

        if let Some(log) = &self.event_log {
            if let Err(e) = log.write(&self.source, diagnostic.severity, &text) {
                self.console_line(&format!("Could not log to Event Log: {e}"));
            }
        }

        match presentation {
            Presentation::Background => {}
            Presentation::Quiet => self.console_line(&text),
            Presentation::Interactive => match &self.popup {
                Some(popup) => popup.show(self.title(), &text, diagnostic.severity.icon()),
                None => self.console_line(&text),
            },
        }
    }
}

/// Sink that only records `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic, presentation: Presentation) {
        let text = diagnostic.text();
        match diagnostic.severity {
            Severity::Information => tracing::info!(?presentation, "{text}"),
            Severity::Warning => tracing::warn!(?presentation, "{text}"),
            Severity::Error => tracing::error!(?presentation, "{text}"),
        }
    }
}
