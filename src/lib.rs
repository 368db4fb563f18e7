//! svckeep: run a console application under the host service manager.
//!
//! The library turns an ordinary entry point into a service that registers
//! itself, persists its startup arguments, and answers STOP, PAUSE,
//! CONTINUE and INTERROGATE from the manager.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svckeep::prelude::*;
//!
//! let config = ServiceConfig::new("ExampleAgent");
//! let host = backends(&config);
//! let runtime = ServiceRuntime::new(
//!     config.identity(),
//!     Arc::new(|ctx: WorkerContext| -> u32 {
//!         ctx.pause_point();
//!         0
//!     }),
//!     host.control_host.clone(),
//!     ParameterStore::new(host.store.clone()),
//!     host.sink.clone(),
//! );
//! Arc::new(runtime).run_as_service(host.dispatcher.as_ref());
//! ```

pub use svckeep_core as core;
pub use svckeep_platform as platform;

/// Prelude module for common imports.
pub mod prelude {
    pub use svckeep_core::{
        CommandLine, Diagnostic, DiagnosticSink, ParameterStore, Registration,
        RegistrationError, RegistrationManager, RuntimeError, ServiceAction, ServiceConfig,
        ServiceEntry, ServiceIdentity, ServiceRuntime, ServiceState, StopHandle, WorkerContext,
        parse_command_line,
    };
    pub use svckeep_platform::{Backends, Host, backends, detect_host};
}
