//! Service runtime: the lifecycle state machine.
//!
//! [`ServiceRuntime::service_main`] is what the host manager runs when it
//! starts the service:
//!
//! 1. rebuild argv from the manager's arguments and the stored parameters;
//! 2. register the control handler (fatal on failure);
//! 3. report START_PENDING;
//! 4. acquire the worker's security context (fatal on failure);
//! 5. start the worker and report RUNNING;
//! 6. serve control requests until the worker ends;
//! 7. report STOPPED with the worker's exit value.
//!
//! Only the runtime changes state. The [`ControlDispatcher`] forwards
//! requests over a channel; the runtime applies them in order from a
//! single-threaded executor that also watches the worker and sends
//! heartbeats while a pending state lasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;

use crate::config::DEFAULT_WAIT_HINT;
use crate::diagnostic::{Diagnostic, DiagnosticSink, Presentation};
use crate::dispatcher::ControlDispatcher;
use crate::error::RuntimeError;
use crate::host::{ControlHost, ServiceDispatcher, ServiceMain};
use crate::parameters::ParameterStore;
use crate::status::{StateCell, StatusTracker};
use crate::types::{ControlCode, ServiceExitCode, ServiceIdentity, ServiceState, ServiceStatus, StartupParameters};
use crate::worker::{
    ServiceEntry, StopHandle, ThreadSpawner, WorkerContext, WorkerExit, WorkerHandle, WorkerLaunch,
    WorkerSpawner,
};

/// Outcome of one service run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Argv the worker was started with.
    pub argv: Vec<String>,
    /// How the worker ended.
    pub exit: WorkerExit,
    /// True if the worker was forcefully terminated.
    pub forced: bool,
    /// Final status reported to the manager.
    pub final_status: ServiceStatus,
}

/// Runs an entry point under the host service manager.
pub struct ServiceRuntime {
    identity: ServiceIdentity,
    entry: Arc<dyn ServiceEntry>,
    stop: Option<Arc<dyn StopHandle>>,
    spawner: Arc<dyn WorkerSpawner>,
    control_host: Arc<dyn ControlHost>,
    parameters: ParameterStore,
    sink: Arc<dyn DiagnosticSink>,
    wait_hint: Duration,
}

impl ServiceRuntime {
    /// Creates a runtime for `entry`.
    ///
    /// Without a stop handle, STOP forcefully terminates the worker.
    #[must_use]
    pub fn new(
        identity: ServiceIdentity,
        entry: Arc<dyn ServiceEntry>,
        control_host: Arc<dyn ControlHost>,
        parameters: ParameterStore,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            identity,
            entry,
            stop: None,
            spawner: Arc::new(ThreadSpawner),
            control_host,
            parameters,
            sink,
            wait_hint: DEFAULT_WAIT_HINT,
        }
    }

    /// Registers a cooperative stop handle.
    #[must_use]
    pub fn with_stop_handle(mut self, stop: Arc<dyn StopHandle>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Replaces the worker spawner.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Sets the wait hint reported with pending states.
    #[must_use]
    pub fn with_wait_hint(mut self, wait_hint: Duration) -> Self {
        self.wait_hint = wait_hint;
        self
    }

    /// Service identity.
    #[must_use]
    pub const fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Hands the process to the manager's dispatch loop.
    ///
    /// Returns true once the service has run and stopped. Returns false if
    /// dispatch was rejected (typically the process was started from a
    /// console); the caller should then run the entry point in the
    /// foreground, for instance with [`run_console`](Self::run_console).
    pub fn run_as_service(self: Arc<Self>, dispatcher: &dyn ServiceDispatcher) -> bool {
        let runtime = Arc::clone(&self);
        let service_main: ServiceMain = Box::new(move |args| {
            if let Err(e) = runtime.service_main(args) {
                tracing::error!(service = %runtime.identity.name, error = %e, "service run failed");
            }
        });

        match dispatcher.start(&self.identity.name, service_main) {
            Ok(()) => true,
            Err(source) => {
                let err = RuntimeError::DispatcherRejected {
                    name: self.identity.name.clone(),
                    source,
                };
                tracing::debug!(error = %err, "dispatch rejected");
                self.background(
                    Diagnostic::error(format!("Couldn't start service - {}", self.identity.name))
                        .with_os_error(&err),
                );
                false
            }
        }
    }

    /// Runs the entry point on the calling thread, outside the manager.
    pub fn run_console(&self, args: Vec<String>) -> u32 {
        tracing::info!(service = %self.identity.name, "running in console mode");
        self.entry.run(WorkerContext::detached(args))
    }

    /// Rebuilds the worker's argv.
    ///
    /// A non-empty stored sequence replaces the manager's arguments after
    /// argv[0]. A read failure keeps the prefix read before it.
    pub fn reconstruct_argv(&self, manager_args: Vec<String>) -> StartupParameters {
        let load = self.parameters.load_parameters_detailed(&self.identity);
        if let Some(failure) = &load.failure {
            self.background(
                Diagnostic::warning(format!(
                    "Startup parameters of {} truncated at {}, {} kept",
                    self.identity.name,
                    failure.key,
                    load.values.len()
                ))
                .with_os_error(&failure.error),
            );
        }
        StartupParameters::reconstruct(manager_args, load.values, &self.identity.name)
    }

    /// Service main function, run on the manager's thread.
    ///
    /// Blocks until the worker has ended and STOPPED has been reported.
    ///
    /// # Errors
    /// Returns a fatal [`RuntimeError`] if the service could not be brought
    /// up. Each is reported through the diagnostic sink first.
    pub fn service_main(&self, manager_args: Vec<String>) -> Result<RunSummary, RuntimeError> {
        let name = self.identity.name.as_str();
        let argv = self.reconstruct_argv(manager_args).into_vec();
        tracing::info!(service = %name, ?argv, "service starting");

        let cell = StateCell::new(ServiceState::StartPending);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let dispatcher = ControlDispatcher::new(name, cell.clone(), control_tx);
        let reporter = self
            .control_host
            .register_control_handler(name, dispatcher.into_handler())
            .map_err(|e| {
                self.background(
                    Diagnostic::error(format!("Couldn't register service control handler - {name}"))
                        .with_os_error(&e),
                );
                RuntimeError::DispatchRegistration(e)
            })?;

        let mut tracker = StatusTracker::with_cell(name, reporter, self.wait_hint, cell);
        tracker.transition(ServiceState::StartPending);

        let security = match self.spawner.acquire_context() {
            Ok(security) => security,
            Err(e) => return Err(self.abort_start(&mut tracker, "Couldn't init security context", e)),
        };
        tracing::debug!(service = %name, context = security.kind(), "security context acquired");

        let executor = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(executor) => executor,
            Err(e) => {
                return Err(self.abort_start(&mut tracker, "Couldn't start service executor", e.into()));
            }
        };

        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        let launch = WorkerLaunch::new(format!("{name}-worker"), Arc::clone(&self.entry), argv.clone(), exit_tx);
        let mut worker = match self.spawner.spawn(&security, launch) {
            Ok(worker) => worker,
            Err(e) => return Err(self.abort_start(&mut tracker, "Couldn't start worker thread", e)),
        };
        tracker.transition(ServiceState::Running);
        tracing::info!(service = %name, native = worker.is_native(), "service running");

        let exit = executor.block_on(self.supervise(&mut tracker, &mut worker, &mut exit_rx, &mut control_rx));
        let forced = worker.is_terminated();

        let final_status =
            tracker.transition_with_exit(ServiceState::Stopped, ServiceExitCode::from_worker(exit.exit_code()));
        tracing::info!(service = %name, ?exit, forced, "service stopped");

        worker.release();
        drop(security);

        Ok(RunSummary {
            argv,
            exit,
            forced,
            final_status,
        })
    }

    async fn supervise(
        &self,
        tracker: &mut StatusTracker,
        worker: &mut WorkerHandle,
        exits: &mut UnboundedReceiver<WorkerExit>,
        controls: &mut UnboundedReceiver<ControlCode>,
    ) -> WorkerExit {
        let mut heartbeat = tokio::time::interval(heartbeat_period(self.wait_hint));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                biased;
                exit = exits.recv() => return exit.unwrap_or(WorkerExit::Terminated),
                Some(code) = controls.recv() => self.apply(code, tracker, worker),
                _ = heartbeat.tick() => {
                    tracker.heartbeat();
                }
            }
        }
    }

    /// Applies one control request. The state is re-checked here because
    /// it may have changed since the dispatcher forwarded the request.
    fn apply(&self, code: ControlCode, tracker: &mut StatusTracker, worker: &mut WorkerHandle) {
        let state = tracker.state();
        match code {
            ControlCode::Stop => {
                if matches!(state, ServiceState::StopPending | ServiceState::Stopped) {
                    return;
                }
                tracker.transition(ServiceState::StopPending);
                self.stop_worker(state, worker);
            }
            ControlCode::Pause => {
                if state != ServiceState::Running {
                    tracing::debug!(service = %self.identity.name, %state, "pause ignored");
                    return;
                }
                tracker.transition(ServiceState::PausePending);
                match worker.suspend() {
                    Ok(()) => {
                        tracker.transition(ServiceState::Paused);
                    }
                    Err(e) => {
                        self.background(
                            Diagnostic::warning(format!("Couldn't pause {}", self.identity.name)).with_os_error(&e),
                        );
                        tracker.transition(ServiceState::Running);
                    }
                }
            }
            ControlCode::Continue => {
                if state != ServiceState::Paused {
                    tracing::debug!(service = %self.identity.name, %state, "continue ignored");
                    return;
                }
                tracker.transition(ServiceState::ContinuePending);
                match worker.resume() {
                    Ok(()) => {
                        tracker.transition(ServiceState::Running);
                    }
                    Err(e) => {
                        self.background(
                            Diagnostic::warning(format!("Couldn't continue {}", self.identity.name)).with_os_error(&e),
                        );
                        tracker.transition(ServiceState::Paused);
                    }
                }
            }
            ControlCode::Interrogate => {
                tracker.interrogate();
            }
        }
    }

    fn stop_worker(&self, previous: ServiceState, worker: &mut WorkerHandle) {
        match &self.stop {
            Some(stop) => {
                // a suspended worker cannot observe the stop request
                if matches!(
                    previous,
                    ServiceState::Paused | ServiceState::PausePending | ServiceState::ContinuePending
                ) {
                    if let Err(e) = worker.resume() {
                        tracing::warn!(service = %self.identity.name, error = %e, "resume before stop failed");
                    }
                }
                tracing::info!(service = %self.identity.name, "requesting cooperative stop");
                stop.request_stop();
            }
            None => {
                // Unsafe fallback: the worker's locks and in-flight I/O are abandoned.
                self.background(Diagnostic::warning(format!(
                    "{} has no stop handler, terminating worker forcefully",
                    self.identity.name
                )));
                worker.terminate();
            }
        }
    }

    fn abort_start(&self, tracker: &mut StatusTracker, what: &str, err: RuntimeError) -> RuntimeError {
        self.background(Diagnostic::error(format!("{what} - {}", self.identity.name)).with_os_error(&err));
        tracker.transition_with_exit(ServiceState::Stopped, ServiceExitCode::EXCEPTION_IN_SERVICE);
        err
    }

    fn background(&self, diagnostic: Diagnostic) {
        self.sink.emit(&diagnostic, Presentation::Background);
    }
}

impl std::fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("identity", &self.identity)
            .field("stop_handle", &self.stop.is_some())
            .field("wait_hint", &self.wait_hint)
            .finish_non_exhaustive()
    }
}

/// Interval between re-reports of a pending state: half the wait hint.
fn heartbeat_period(wait_hint: Duration) -> Duration {
    (wait_hint / 2).max(Duration::from_millis(10))
}
