//! Core types for the service lifecycle.
//!
//! The state machine is explicit: every state a service reports to the host
//! manager is a [`ServiceState`] variant and every request the manager can
//! deliver is a [`ControlCode`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of a registered service.
///
/// Immutable once registered; the name keys both the service record in the
/// host manager and the namespace in the parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Service name (record key).
    pub name: String,
    /// Name shown by service management tools.
    pub display_name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

impl ServiceIdentity {
    /// Creates an identity whose display name equals its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How the host manager starts the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartType {
    /// Started at boot.
    #[default]
    Auto,
    /// Started on request.
    Demand,
    /// Cannot be started.
    Disabled,
}

/// Service lifecycle state.
///
/// ```text
/// StartPending → Running → StopPending → Stopped
///                   ↕
///   PausePending → Paused → ContinuePending → Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    /// The service is starting.
    StartPending,
    /// The worker is running.
    Running,
    /// A pause was requested and is being carried out.
    PausePending,
    /// The worker is suspended.
    Paused,
    /// A continue was requested and is being carried out.
    ContinuePending,
    /// A stop was requested and is being carried out.
    StopPending,
    /// The service has stopped.
    Stopped,
}

impl ServiceState {
    /// All states, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::StartPending,
        Self::Running,
        Self::PausePending,
        Self::Paused,
        Self::ContinuePending,
        Self::StopPending,
        Self::Stopped,
    ];

    /// Returns true for the transitional `*Pending` states.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::StartPending | Self::PausePending | Self::ContinuePending | Self::StopPending
        )
    }

    /// Returns true if the service has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the host manager should stop the service before its
    /// record is deleted.
    #[must_use]
    pub const fn needs_stop_before_delete(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns true if entering this state resets the checkpoint counter.
    #[must_use]
    pub const fn resets_checkpoint(&self) -> bool {
        matches!(self, Self::Running | Self::Stopped)
    }

    /// Control codes the service accepts while in this state.
    #[must_use]
    pub const fn accepted_controls(&self) -> AcceptedControls {
        match self {
            Self::StartPending | Self::StopPending | Self::Stopped => AcceptedControls::NONE,
            Self::Running | Self::PausePending | Self::Paused | Self::ContinuePending => {
                AcceptedControls::STOP.union(AcceptedControls::PAUSE_CONTINUE)
            }
        }
    }

    /// Host manager state code (`SERVICE_STOPPED` = 1 .. `SERVICE_PAUSED` = 7).
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        match self {
            Self::Stopped => 1,
            Self::StartPending => 2,
            Self::StopPending => 3,
            Self::Running => 4,
            Self::ContinuePending => 5,
            Self::PausePending => 6,
            Self::Paused => 7,
        }
    }

    /// Converts a host manager state code.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Stopped),
            2 => Some(Self::StartPending),
            3 => Some(Self::StopPending),
            4 => Some(Self::Running),
            5 => Some(Self::ContinuePending),
            6 => Some(Self::PausePending),
            7 => Some(Self::Paused),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartPending => "START_PENDING",
            Self::Running => "RUNNING",
            Self::PausePending => "PAUSE_PENDING",
            Self::Paused => "PAUSED",
            Self::ContinuePending => "CONTINUE_PENDING",
            Self::StopPending => "STOP_PENDING",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Asynchronous request delivered by the host manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCode {
    /// Stop the service.
    Stop,
    /// Suspend the worker.
    Pause,
    /// Resume a suspended worker.
    Continue,
    /// Re-report the current status.
    Interrogate,
}

impl ControlCode {
    /// Host manager control code (`SERVICE_CONTROL_STOP` = 1 ..).
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        match self {
            Self::Stop => 1,
            Self::Pause => 2,
            Self::Continue => 3,
            Self::Interrogate => 4,
        }
    }

    /// Converts a host manager control code. Unknown codes yield `None`.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Stop),
            2 => Some(Self::Pause),
            3 => Some(Self::Continue),
            4 => Some(Self::Interrogate),
            _ => None,
        }
    }
}

/// Set of control codes a service accepts, as a host manager bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AcceptedControls(u32);

impl AcceptedControls {
    /// Accepts nothing.
    pub const NONE: Self = Self(0);
    /// Accepts STOP.
    pub const STOP: Self = Self(0x1);
    /// Accepts PAUSE and CONTINUE.
    pub const PAUSE_CONTINUE: Self = Self(0x2);

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no control is accepted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit mask.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if `code` is accepted. INTERROGATE is always accepted.
    #[must_use]
    pub const fn accepts(&self, code: ControlCode) -> bool {
        match code {
            ControlCode::Stop => self.contains(Self::STOP),
            ControlCode::Pause | ControlCode::Continue => self.contains(Self::PAUSE_CONTINUE),
            ControlCode::Interrogate => true,
        }
    }
}

/// Exit code carried by a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceExitCode {
    /// Generic OS code; `Win32(0)` means no error.
    Win32(u32),
    /// Application-specific code (the worker's exit value).
    ServiceSpecific(u32),
}

impl ServiceExitCode {
    /// No error.
    pub const NO_ERROR: Self = Self::Win32(0);

    /// `ERROR_EXCEPTION_IN_SERVICE`: the service failed before its worker ran.
    pub const EXCEPTION_IN_SERVICE: Self = Self::Win32(1064);

    /// Maps a worker exit value: zero is no error, anything else is
    /// reported as service-specific.
    #[must_use]
    pub const fn from_worker(code: u32) -> Self {
        if code == 0 {
            Self::NO_ERROR
        } else {
            Self::ServiceSpecific(code)
        }
    }
}

impl Default for ServiceExitCode {
    fn default() -> Self {
        Self::NO_ERROR
    }
}

/// One status report sent to the host manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Current state.
    pub state: ServiceState,
    /// Controls accepted in this state.
    pub controls_accepted: AcceptedControls,
    /// Progress counter for pending states.
    pub checkpoint: u32,
    /// How long the manager should wait before assuming a stall.
    pub wait_hint: Duration,
    /// Exit code.
    pub exit_code: ServiceExitCode,
}

/// Ordered startup arguments (argv) of the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartupParameters(Vec<String>);

impl StartupParameters {
    /// Wraps an argument list.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    /// Rebuilds argv for the worker.
    ///
    /// When `stored` is non-empty the result is the manager's argv[0]
    /// followed by the stored sequence; otherwise the manager's arguments
    /// are used unchanged. `fallback_argv0` fills argv[0] when the manager
    /// supplied nothing.
    #[must_use]
    pub fn reconstruct(manager_args: Vec<String>, stored: Vec<String>, fallback_argv0: &str) -> Self {
        if stored.is_empty() {
            return Self(manager_args);
        }
        let argv0 = manager_args
            .into_iter()
            .next()
            .unwrap_or_else(|| fallback_argv0.to_string());
        let mut argv = Vec::with_capacity(stored.len() + 1);
        argv.push(argv0);
        argv.extend(stored);
        Self(argv)
    }

    /// Returns the arguments.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for StartupParameters {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}
