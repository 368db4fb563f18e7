//! Host service manager abstraction.
//!
//! Two sides of the manager are modelled:
//!
//! - the administrative side used at install time ([`ServiceManager`],
//!   [`ManagerConnection`], [`ServiceRecordHandle`]);
//! - the runtime side used by a running service ([`ServiceDispatcher`],
//!   [`ControlHost`], [`StatusReporter`]).
//!
//! Connections and record handles release their native resources on drop,
//! so every exit path of a caller, including early failure, releases them.

use std::path::PathBuf;

use crate::error::HostResult;
use crate::types::{ControlCode, ServiceState, ServiceStatus, StartType};

/// Service record created at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Executable the manager starts.
    pub executable: PathBuf,
    /// Arguments the manager passes to the executable.
    pub launch_arguments: Vec<String>,
    /// Start type.
    pub start_type: StartType,
}

impl ServiceRecord {
    /// Command line the manager runs: the quoted executable followed by the
    /// launch arguments.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.executable.display());
        for arg in &self.launch_arguments {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Entry into the host manager's administrative interface.
pub trait ServiceManager: Send + Sync {
    /// Opens a connection with rights to create services.
    fn connect(&self) -> HostResult<Box<dyn ManagerConnection>>;
}

/// Open connection to the host manager.
pub trait ManagerConnection {
    /// Creates a service record.
    fn create_service(&self, record: &ServiceRecord) -> HostResult<Box<dyn ServiceRecordHandle>>;

    /// Opens an existing service record.
    fn open_service(&self, name: &str) -> HostResult<Box<dyn ServiceRecordHandle>>;
}

/// Open handle to a service record.
pub trait ServiceRecordHandle {
    /// Queries the service's current state.
    fn query_state(&self) -> HostResult<ServiceState>;

    /// Sends STOP to the service.
    fn stop(&self) -> HostResult<()>;

    /// Marks the record for deletion.
    fn delete(&self) -> HostResult<()>;
}

/// Answer of a control handler to the host manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// The request was queued for the runtime.
    Accepted,
    /// The request does not apply to the current state; nothing happens.
    Ignored,
    /// The control code is not handled by this service.
    NotImplemented,
    /// The runtime has already shut down.
    Closed,
}

/// Callback the host manager invokes for each control request.
pub type ControlHandler = Box<dyn Fn(ControlCode) -> ControlResponse + Send + Sync>;

/// Service main function handed to the dispatcher; receives the manager's
/// arguments.
pub type ServiceMain = Box<dyn FnOnce(Vec<String>) + Send>;

/// Connects the process to the host manager's dispatch loop.
pub trait ServiceDispatcher: Send + Sync {
    /// Hands control to the manager, which calls `service_main` on its own
    /// thread. Blocks until the service has stopped.
    ///
    /// Fails (without calling `service_main`) when the process was not
    /// started by the manager.
    fn start(&self, service_name: &str, service_main: ServiceMain) -> HostResult<()>;
}

/// Registration of control handlers for a running service.
pub trait ControlHost: Send + Sync {
    /// Registers `handler` for `service_name` and returns the reporter used
    /// to publish status.
    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> HostResult<Box<dyn StatusReporter>>;
}

/// Publishes status to the host manager.
pub trait StatusReporter: Send {
    /// Sends one status report. Must not block indefinitely.
    fn report(&self, status: &ServiceStatus) -> HostResult<()>;
}
