// Allow unwrap/expect/panic in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # svckeep-core
//!
//! Platform-neutral service lifecycle core.
//!
//! Lets a console application register itself with the host service
//! manager, keep its startup arguments across restarts, and be driven
//! through START_PENDING → RUNNING ⇄ PAUSED → STOPPED by manager control
//! requests.
//!
//! - [`RegistrationManager`] creates and deletes the service record
//! - [`ParameterStore`] persists startup arguments and the description
//! - [`ServiceRuntime`] is the state machine run by the manager
//! - [`ControlDispatcher`] maps control codes to runtime requests
//! - [`DiagnosticRouter`] writes operator-facing messages
//!
//! Every host facility is reached through a trait in [`host`], [`store`]
//! and [`diagnostic`], so the whole lifecycle can run against fakes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use svckeep_core::{ServiceRuntime, ServiceIdentity, WorkerContext};
//!
//! let runtime = ServiceRuntime::new(
//!     ServiceIdentity::new("ExampleAgent"),
//!     Arc::new(|ctx: WorkerContext| {
//!         // application logic
//!         0
//!     }),
//!     control_host,
//!     parameters,
//!     sink,
//! );
//! if !Arc::new(runtime).run_as_service(&dispatcher) {
//!     // started from a console
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod dispatcher;
pub mod error;
pub mod event_source;
pub mod host;
pub mod parameters;
pub mod registration;
pub mod runtime;
pub mod status;
pub mod store;
#[cfg(test)]
pub mod tests;
pub mod types;
pub mod worker;

pub use cli::{CommandLine, ServiceAction, parse_command_line};
pub use config::{ConfigError, ServiceConfig, StoreConfig};
pub use diagnostic::{
    Diagnostic, DiagnosticRouter, DiagnosticSink, EventLogWriter, Icon, PopupPresenter,
    Presentation, Severity, TracingSink,
};
pub use dispatcher::ControlDispatcher;
pub use error::{HostError, HostResult, RegistrationError, RuntimeError, StoreError, StoreResult};
pub use host::{
    ControlHandler, ControlHost, ControlResponse, ManagerConnection, ServiceDispatcher,
    ServiceMain, ServiceManager, ServiceRecord, ServiceRecordHandle, StatusReporter,
};
pub use parameters::ParameterStore;
pub use registration::{Registration, RegistrationManager};
pub use runtime::{RunSummary, ServiceRuntime};
pub use status::{StateCell, StatusTracker};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreValue};
pub use types::{
    AcceptedControls, ControlCode, ServiceExitCode, ServiceIdentity, ServiceState, ServiceStatus,
    StartType, StartupParameters,
};
pub use worker::{
    PauseGate, SecurityContext, ServiceEntry, StopHandle, ThreadControl, ThreadSpawner,
    WorkerBody, WorkerContext, WorkerExit, WorkerHandle, WorkerLaunch, WorkerSpawner,
};
