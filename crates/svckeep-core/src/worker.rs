//! Worker execution context.
//!
//! The worker is a dedicated thread running the caller's [`ServiceEntry`].
//! The runtime owns it through a [`WorkerHandle`] and learns of its end
//! through a [`WorkerExit`] message.
//!
//! # Suspension
//!
//! With native [`ThreadControl`] attached, PAUSE suspends the whole thread
//! wherever it was preempted. Without it, the worker pauses the next time it
//! calls [`WorkerContext::pause_point`].
//!
//! # Forceful termination
//!
//! [`WorkerHandle::terminate`] is the fallback for STOP when no
//! [`StopHandle`] is registered. It is not cancellation-safe: locks held and
//! I/O in flight inside the worker are abandoned.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::RuntimeError;

/// Application logic run as a service.
pub trait ServiceEntry: Send + Sync + 'static {
    /// Runs the application and returns its exit value.
    fn run(&self, ctx: WorkerContext) -> u32;
}

impl<F> ServiceEntry for F
where
    F: Fn(WorkerContext) -> u32 + Send + Sync + 'static,
{
    fn run(&self, ctx: WorkerContext) -> u32 {
        self(ctx)
    }
}

/// Cooperative stop request.
///
/// Registered by the caller before the service starts; invoked once when
/// STOP arrives. It must signal the worker to return and must not block.
pub trait StopHandle: Send + Sync {
    /// Asks the worker to exit.
    fn request_stop(&self);
}

impl<F> StopHandle for F
where
    F: Fn() + Send + Sync,
{
    fn request_stop(&self) {
        self();
    }
}

/// Gate the worker waits at while paused.
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the gate.
    pub fn pause(&self) {
        *self.inner.0.lock() = true;
    }

    /// Opens the gate and wakes the waiting worker.
    pub fn resume(&self) {
        let (paused, cvar) = &*self.inner;
        *paused.lock() = false;
        cvar.notify_all();
    }

    /// Returns true while the gate is closed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Blocks while the gate is closed.
    pub fn wait(&self) {
        let (paused, cvar) = &*self.inner;
        let mut guard = paused.lock();
        while *guard {
            cvar.wait(&mut guard);
        }
    }
}

/// What the worker sees of the service.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    args: Vec<String>,
    gate: PauseGate,
}

impl WorkerContext {
    /// Creates a context that is never paused (foreground mode).
    #[must_use]
    pub fn detached(args: Vec<String>) -> Self {
        Self {
            args,
            gate: PauseGate::new(),
        }
    }

    /// Reconstructed argv; `args()[0]` is the program or service name.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Blocks while the service is paused.
    ///
    /// Long-running loops should call this once per iteration.
    pub fn pause_point(&self) {
        self.gate.wait();
    }

    /// Returns true if a pause is in effect.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }
}

/// How the worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The entry point returned this value.
    Returned(u32),
    /// The entry point panicked.
    Panicked,
    /// The worker was forcefully terminated.
    Terminated,
}

impl WorkerExit {
    /// Value reported as the service-specific exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u32 {
        match self {
            Self::Returned(code) => *code,
            Self::Panicked => 1,
            Self::Terminated => 0,
        }
    }
}

/// Native whole-thread control.
pub trait ThreadControl: Send {
    /// Suspends the thread.
    ///
    /// # Errors
    /// Returns the OS error if the thread could not be suspended.
    fn suspend(&self) -> io::Result<()>;

    /// Resumes a suspended thread.
    ///
    /// # Errors
    /// Returns the OS error if the thread could not be resumed.
    fn resume(&self) -> io::Result<()>;

    /// Kills the thread immediately.
    ///
    /// # Errors
    /// Returns the OS error if the thread could not be terminated.
    fn terminate(&self) -> io::Result<()>;
}

/// Security context the worker is created under.
///
/// Held by the runtime until the worker has been released.
pub struct SecurityContext {
    kind: &'static str,
    guard: Option<Box<dyn Any + Send + Sync>>,
}

impl SecurityContext {
    /// The worker inherits the process security context.
    #[must_use]
    pub const fn inherited() -> Self {
        Self {
            kind: "inherited",
            guard: None,
        }
    }

    /// A context backed by a native resource that must live as long as the
    /// worker.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(kind: &'static str, guard: T) -> Self {
        Self {
            kind,
            guard: Some(Box::new(guard)),
        }
    }

    /// Short description for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns the native resource if it is a `T`.
    #[must_use]
    pub fn guard<T: Any>(&self) -> Option<&T> {
        self.guard.as_ref().and_then(|g| g.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Everything needed to start one worker.
pub struct WorkerLaunch {
    thread_name: String,
    entry: Arc<dyn ServiceEntry>,
    args: Vec<String>,
    exit: UnboundedSender<WorkerExit>,
}

impl WorkerLaunch {
    /// Describes a worker running `entry` with `args`, reporting its end on
    /// `exit`.
    #[must_use]
    pub fn new(
        thread_name: impl Into<String>,
        entry: Arc<dyn ServiceEntry>,
        args: Vec<String>,
        exit: UnboundedSender<WorkerExit>,
    ) -> Self {
        Self {
            thread_name: thread_name.into(),
            entry,
            args,
            exit,
        }
    }

    /// Name for the worker thread.
    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Splits the launch into the body to run on the new thread and the
    /// handle the runtime keeps.
    #[must_use]
    pub fn into_parts(self) -> (WorkerBody, WorkerHandle) {
        let gate = PauseGate::new();
        let ctx = WorkerContext {
            args: self.args,
            gate: gate.clone(),
        };
        let body = WorkerBody {
            entry: self.entry,
            ctx,
            exit: self.exit.clone(),
        };
        let handle = WorkerHandle {
            gate,
            exit: self.exit,
            join: None,
            native: None,
            terminated: false,
        };
        (body, handle)
    }
}

impl std::fmt::Debug for WorkerLaunch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLaunch")
            .field("thread_name", &self.thread_name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Code executed on the worker thread.
pub struct WorkerBody {
    entry: Arc<dyn ServiceEntry>,
    ctx: WorkerContext,
    exit: UnboundedSender<WorkerExit>,
}

impl WorkerBody {
    /// Runs the entry point and reports how it ended.
    pub fn run(self) {
        let Self { entry, ctx, exit } = self;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| entry.run(ctx))) {
            Ok(code) => WorkerExit::Returned(code),
            Err(_) => {
                tracing::error!("service entry point panicked");
                WorkerExit::Panicked
            }
        };
        // the runtime may be gone after a forced stop
        let _ = exit.send(outcome);
    }
}

impl std::fmt::Debug for WorkerBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBody").finish_non_exhaustive()
    }
}

/// The runtime's reference to the running worker.
pub struct WorkerHandle {
    gate: PauseGate,
    exit: UnboundedSender<WorkerExit>,
    join: Option<JoinHandle<()>>,
    native: Option<Box<dyn ThreadControl>>,
    terminated: bool,
}

impl WorkerHandle {
    /// Attaches the join handle of the worker thread.
    #[must_use]
    pub fn with_join(mut self, join: JoinHandle<()>) -> Self {
        self.join = Some(join);
        self
    }

    /// Attaches native thread control.
    #[must_use]
    pub fn with_native(mut self, native: Box<dyn ThreadControl>) -> Self {
        self.native = Some(native);
        self
    }

    /// Join handle of the worker thread, if it was spawned through `std`.
    #[must_use]
    pub const fn join_handle(&self) -> Option<&JoinHandle<()>> {
        self.join.as_ref()
    }

    /// Returns true once [`terminate`](Self::terminate) has been called.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Returns true if suspension and termination act on the OS thread.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// Suspends the worker.
    ///
    /// # Errors
    /// Returns the OS error if native suspension failed.
    pub fn suspend(&self) -> io::Result<()> {
        match &self.native {
            Some(native) => native.suspend(),
            None => {
                self.gate.pause();
                Ok(())
            }
        }
    }

    /// Resumes a suspended worker.
    ///
    /// # Errors
    /// Returns the OS error if native resumption failed.
    pub fn resume(&self) -> io::Result<()> {
        match &self.native {
            Some(native) => native.resume(),
            None => {
                self.gate.resume();
                Ok(())
            }
        }
    }

    /// Forcefully ends the worker and reports [`WorkerExit::Terminated`].
    ///
    /// Natively the thread is killed. Otherwise it is abandoned: the runtime
    /// stops waiting for it and the thread is detached.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        match &self.native {
            Some(native) => {
                if let Err(e) = native.terminate() {
                    tracing::error!(error = %e, "native worker termination failed, abandoning thread");
                }
            }
            None => tracing::warn!("abandoning worker thread"),
        }
        self.join = None;
        let _ = self.exit.send(WorkerExit::Terminated);
    }

    /// Releases the worker after its exit has been collected.
    ///
    /// Joins a thread that returned on its own; a terminated thread is
    /// detached.
    pub fn release(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("worker thread ended with a panic");
            }
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("native", &self.native.is_some())
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

/// Creates the worker execution context.
pub trait WorkerSpawner: Send + Sync {
    /// Builds the security context the worker runs under.
    ///
    /// # Errors
    /// Returns [`RuntimeError::SecurityContext`] if it cannot be built.
    fn acquire_context(&self) -> Result<SecurityContext, RuntimeError>;

    /// Starts the worker.
    ///
    /// # Errors
    /// Returns [`RuntimeError::WorkerSpawn`] if the thread cannot be started.
    fn spawn(&self, ctx: &SecurityContext, launch: WorkerLaunch) -> Result<WorkerHandle, RuntimeError>;
}

/// Portable spawner: a `std` thread with cooperative pause points.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn acquire_context(&self) -> Result<SecurityContext, RuntimeError> {
        Ok(SecurityContext::inherited())
    }

    fn spawn(&self, _ctx: &SecurityContext, launch: WorkerLaunch) -> Result<WorkerHandle, RuntimeError> {
        let name = launch.thread_name().to_string();
        let (body, handle) = launch.into_parts();
        let join = std::thread::Builder::new()
            .name(name)
            .spawn(move || body.run())
            .map_err(|e| RuntimeError::worker_spawn(e.to_string()))?;
        Ok(handle.with_join(join))
    }
}
