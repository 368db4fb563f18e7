//! Status tracking and reporting.
//!
//! [`StatusTracker`] is the single owner of the service state. Every
//! transition is immediately reported to the host manager together with the
//! accepted controls, the checkpoint and the wait hint. Other threads only
//! observe the state through a [`StateCell`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::host::StatusReporter;
use crate::types::{ServiceExitCode, ServiceState, ServiceStatus};

/// Read-only, lock-free view of the current state.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU32>);

impl StateCell {
    /// Creates a cell holding `state`.
    #[must_use]
    pub fn new(state: ServiceState) -> Self {
        Self(Arc::new(AtomicU32::new(state.as_raw())))
    }

    fn store(&self, state: ServiceState) {
        self.0.store(state.as_raw(), Ordering::Release);
    }

    /// Returns the current state.
    #[must_use]
    pub fn load(&self) -> ServiceState {
        ServiceState::from_raw(self.0.load(Ordering::Acquire)).unwrap_or(ServiceState::Stopped)
    }
}

/// Owns the service state and reports every change.
pub struct StatusTracker {
    service: String,
    reporter: Box<dyn StatusReporter>,
    cell: StateCell,
    wait_hint: Duration,
    next_checkpoint: u32,
    current: ServiceStatus,
}

impl StatusTracker {
    /// Creates a tracker. Nothing is reported until the first transition.
    #[must_use]
    pub fn new(service: impl Into<String>, reporter: Box<dyn StatusReporter>, wait_hint: Duration) -> Self {
        Self::with_cell(service, reporter, wait_hint, StateCell::new(ServiceState::StartPending))
    }

    /// Creates a tracker publishing to an existing cell, so observers can be
    /// wired before the reporter exists.
    #[must_use]
    pub fn with_cell(
        service: impl Into<String>,
        reporter: Box<dyn StatusReporter>,
        wait_hint: Duration,
        cell: StateCell,
    ) -> Self {
        let initial = ServiceState::StartPending;
        cell.store(initial);
        Self {
            service: service.into(),
            reporter,
            cell,
            wait_hint,
            next_checkpoint: 1,
            current: ServiceStatus {
                state: initial,
                controls_accepted: initial.accepted_controls(),
                checkpoint: 0,
                wait_hint,
                exit_code: ServiceExitCode::NO_ERROR,
            },
        }
    }

    /// Returns a view of the state for other threads.
    #[must_use]
    pub fn cell(&self) -> StateCell {
        self.cell.clone()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        self.current.state
    }

    /// Last status reported.
    #[must_use]
    pub const fn current(&self) -> &ServiceStatus {
        &self.current
    }

    /// Moves to `state` and reports it.
    pub fn transition(&mut self, state: ServiceState) -> ServiceStatus {
        self.transition_with_exit(state, ServiceExitCode::NO_ERROR)
    }

    /// Moves to `state` with an exit code and reports it.
    ///
    /// Entering RUNNING or STOPPED resets the checkpoint to zero; otherwise
    /// the checkpoint keeps increasing.
    pub fn transition_with_exit(&mut self, state: ServiceState, exit_code: ServiceExitCode) -> ServiceStatus {
        let previous = self.current.state;
        if state.resets_checkpoint() {
            self.next_checkpoint = 0;
        }
        self.current = ServiceStatus {
            state,
            controls_accepted: state.accepted_controls(),
            checkpoint: self.take_checkpoint(),
            wait_hint: self.wait_hint,
            exit_code,
        };
        self.cell.store(state);
        tracing::debug!(
            service = %self.service,
            from = %previous,
            to = %state,
            checkpoint = self.current.checkpoint,
            "state transition"
        );
        self.send();
        self.current
    }

    /// Re-reports a pending state with the next checkpoint, telling the
    /// manager the transition is still progressing. Does nothing outside
    /// pending states.
    pub fn heartbeat(&mut self) -> Option<ServiceStatus> {
        if !self.current.state.is_pending() {
            return None;
        }
        self.current.checkpoint = self.take_checkpoint();
        self.send();
        Some(self.current)
    }

    /// Re-reports the current status unchanged.
    pub fn interrogate(&self) -> ServiceStatus {
        self.send();
        self.current
    }

    fn take_checkpoint(&mut self) -> u32 {
        let checkpoint = self.next_checkpoint;
        self.next_checkpoint = self.next_checkpoint.wrapping_add(1);
        checkpoint
    }

    fn send(&self) {
        // Best-effort: a lost report is superseded by the next one.
        if let Err(e) = self.reporter.report(&self.current) {
            tracing::warn!(
                service = %self.service,
                state = %self.current.state,
                error = %e,
                "status report failed"
            );
        }
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("service", &self.service)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
