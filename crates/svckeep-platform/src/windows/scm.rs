//! Service Control Manager bindings.

use std::ffi::OsString;
use std::io;

use parking_lot::Mutex;
use windows_service::service::{
    ServiceAccess, ServiceControl, ServiceControlAccept, ServiceErrorControl,
    ServiceExitCode as ScmExitCode, ServiceInfo, ServiceStartType, ServiceState as ScmState,
    ServiceStatus as ScmStatus, ServiceType,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::service_manager::{ServiceManager as ScmHandle, ServiceManagerAccess};
use windows_service::{define_windows_service, service_dispatcher};

use svckeep_core::{
    ControlCode, ControlHandler, ControlHost, ControlResponse, HostError, HostResult,
    ManagerConnection, ServiceDispatcher, ServiceExitCode, ServiceMain, ServiceManager,
    ServiceRecord, ServiceRecordHandle, ServiceState, ServiceStatus, StartType, StatusReporter,
};

const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;
const ERROR_SERVICE_EXISTS: i32 = 1073;

fn os_error(err: windows_service::Error) -> io::Error {
    match err {
        windows_service::Error::Winapi(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

fn host_error(operation: &'static str, subject: &str, err: windows_service::Error) -> HostError {
    let err = os_error(err);
    match err.raw_os_error() {
        Some(ERROR_SERVICE_EXISTS) => HostError::AlreadyExists(subject.to_string()),
        Some(ERROR_SERVICE_DOES_NOT_EXIST) => HostError::NotFound(subject.to_string()),
        Some(ERROR_ACCESS_DENIED) => HostError::AccessDenied(format!("{operation} {subject}")),
        _ => HostError::os(operation, err),
    }
}

const fn scm_state(state: ServiceState) -> ScmState {
    match state {
        ServiceState::Stopped => ScmState::Stopped,
        ServiceState::StartPending => ScmState::StartPending,
        ServiceState::StopPending => ScmState::StopPending,
        ServiceState::Running => ScmState::Running,
        ServiceState::ContinuePending => ScmState::ContinuePending,
        ServiceState::PausePending => ScmState::PausePending,
        ServiceState::Paused => ScmState::Paused,
    }
}

const fn core_state(state: ScmState) -> ServiceState {
    match state {
        ScmState::Stopped => ServiceState::Stopped,
        ScmState::StartPending => ServiceState::StartPending,
        ScmState::StopPending => ServiceState::StopPending,
        ScmState::Running => ServiceState::Running,
        ScmState::ContinuePending => ServiceState::ContinuePending,
        ScmState::PausePending => ServiceState::PausePending,
        ScmState::Paused => ServiceState::Paused,
    }
}

// =============================================================================
// Administrative side
// =============================================================================

/// Local Service Control Manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmManager;

impl ServiceManager for ScmManager {
    fn connect(&self) -> HostResult<Box<dyn ManagerConnection>> {
        let access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
        let handle = ScmHandle::local_computer(None::<&str>, access)
            .map_err(|e| HostError::unavailable(os_error(e).to_string()))?;
        Ok(Box::new(ScmConnection(handle)))
    }
}

struct ScmConnection(ScmHandle);

fn record_access() -> ServiceAccess {
    ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::DELETE
}

impl ManagerConnection for ScmConnection {
    fn create_service(&self, record: &ServiceRecord) -> HostResult<Box<dyn ServiceRecordHandle>> {
        let info = ServiceInfo {
            name: OsString::from(&record.name),
            display_name: OsString::from(&record.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: match record.start_type {
                StartType::Auto => ServiceStartType::AutoStart,
                StartType::Demand => ServiceStartType::OnDemand,
                StartType::Disabled => ServiceStartType::Disabled,
            },
            error_control: ServiceErrorControl::Normal,
            executable_path: record.executable.clone(),
            launch_arguments: record.launch_arguments.iter().map(OsString::from).collect(),
            dependencies: Vec::new(),
            account_name: None,
            account_password: None,
        };
        let service = self
            .0
            .create_service(&info, record_access())
            .map_err(|e| host_error("CreateService", &record.name, e))?;
        Ok(Box::new(ScmService(service)))
    }

    fn open_service(&self, name: &str) -> HostResult<Box<dyn ServiceRecordHandle>> {
        let service = self
            .0
            .open_service(name, record_access())
            .map_err(|e| host_error("OpenService", name, e))?;
        Ok(Box::new(ScmService(service)))
    }
}

struct ScmService(windows_service::service::Service);

impl ServiceRecordHandle for ScmService {
    fn query_state(&self) -> HostResult<ServiceState> {
        self.0
            .query_status()
            .map(|status| core_state(status.current_state))
            .map_err(|e| HostError::os("QueryServiceStatus", os_error(e)))
    }

    fn stop(&self) -> HostResult<()> {
        self.0
            .stop()
            .map(|_| ())
            .map_err(|e| HostError::os("ControlService", os_error(e)))
    }

    fn delete(&self) -> HostResult<()> {
        self.0
            .delete()
            .map_err(|e| HostError::os("DeleteService", os_error(e)))
    }
}

// =============================================================================
// Runtime side
// =============================================================================

// The SCM calls back into a plain function; the pending service main waits
// here until the dispatcher thread picks it up.
static PENDING_MAIN: Mutex<Option<ServiceMain>> = parking_lot::const_mutex(None);

define_windows_service!(ffi_service_main, enter_service_main);

fn enter_service_main(arguments: Vec<OsString>) {
    let args: Vec<String> = arguments
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let pending = PENDING_MAIN.lock().take();
    match pending {
        Some(main) => main(args),
        None => tracing::error!("service main invoked with no pending entry"),
    }
}

/// Connects the process to the SCM dispatch loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmDispatcher;

impl ServiceDispatcher for ScmDispatcher {
    fn start(&self, service_name: &str, service_main: ServiceMain) -> HostResult<()> {
        *PENDING_MAIN.lock() = Some(service_main);
        let result = service_dispatcher::start(service_name, ffi_service_main);
        drop(PENDING_MAIN.lock().take());

        result.map_err(|e| {
            let err = os_error(e);
            if err.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) {
                HostError::rejected(err.to_string())
            } else {
                HostError::os("StartServiceCtrlDispatcher", err)
            }
        })
    }
}

/// Registers control handlers with the SCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmControlHost;

impl ControlHost for ScmControlHost {
    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> HostResult<Box<dyn StatusReporter>> {
        let handle = service_control_handler::register(service_name, move |control| {
            let response = match control {
                ServiceControl::Stop => handler(ControlCode::Stop),
                ServiceControl::Pause => handler(ControlCode::Pause),
                ServiceControl::Continue => handler(ControlCode::Continue),
                ServiceControl::Interrogate => handler(ControlCode::Interrogate),
                _ => ControlResponse::NotImplemented,
            };
            match response {
                ControlResponse::NotImplemented => ServiceControlHandlerResult::NotImplemented,
                ControlResponse::Accepted | ControlResponse::Ignored | ControlResponse::Closed => {
                    ServiceControlHandlerResult::NoError
                }
            }
        })
        .map_err(|e| HostError::os("RegisterServiceCtrlHandlerEx", os_error(e)))?;
        Ok(Box::new(ScmStatusReporter { handle }))
    }
}

/// Sends status reports through a registered status handle.
pub struct ScmStatusReporter {
    handle: ServiceStatusHandle,
}

impl StatusReporter for ScmStatusReporter {
    fn report(&self, status: &ServiceStatus) -> HostResult<()> {
        let exit_code = match status.exit_code {
            ServiceExitCode::Win32(code) => ScmExitCode::Win32(code),
            ServiceExitCode::ServiceSpecific(code) => ScmExitCode::ServiceSpecific(code),
        };
        self.handle
            .set_service_status(ScmStatus {
                service_type: ServiceType::OWN_PROCESS,
                current_state: scm_state(status.state),
                controls_accepted: ServiceControlAccept::from_bits_truncate(
                    status.controls_accepted.bits(),
                ),
                exit_code,
                checkpoint: status.checkpoint,
                wait_hint: status.wait_hint,
                process_id: None,
            })
            .map_err(|e| HostError::os("SetServiceStatus", os_error(e)))
    }
}
