//! Error types for svckeep-core.
//!
//! Every failure mode is an explicit variant. Fatal errors are surfaced
//! through the diagnostic sink by the component that detects them before
//! they are returned to the caller.

/// Result type for host manager operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Result type for key-value store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// HostError
// =============================================================================

/// Failure reported by the host service manager.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No connection to the host service manager could be opened.
    #[error("service manager unavailable: {0}")]
    Unavailable(String),

    /// A service record with the same name already exists.
    #[error("service already exists: {0}")]
    AlreadyExists(String),

    /// The named service record does not exist.
    #[error("service does not exist: {0}")]
    NotFound(String),

    /// The caller lacks the rights for the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The manager refused the request (e.g. the process was not started by it).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Any other operating system failure.
    #[error("{operation} failed: {source}")]
    Os {
        /// The operation that was attempted.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    /// Creates an "unavailable" error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Creates a "rejected" error.
    #[must_use]
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Wraps an OS error raised by `operation`.
    #[must_use]
    pub const fn os(operation: &'static str, source: std::io::Error) -> Self {
        Self::Os { operation, source }
    }

    /// Returns true if the error means the named record is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// =============================================================================
// StoreError
// =============================================================================

/// Failure of the persistent key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O failure on the backing storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A value exists but has an unexpected type.
    #[error("value {key} has unexpected type {found}")]
    WrongType {
        /// Key of the offending value.
        key: String,
        /// Type found in the store.
        found: String,
    },

    /// Backend-specific failure (e.g. registry status code).
    #[error("{operation} failed on {path}: {reason}")]
    Backend {
        /// The operation that was attempted.
        operation: &'static str,
        /// Namespace or key path.
        path: String,
        /// Backend-provided reason.
        reason: String,
    },
}

impl StoreError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(
        operation: &'static str,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Backend {
            operation,
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// RegistrationError
// =============================================================================

/// Failure to register or unregister a service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Cannot open a connection to the host service manager.
    #[error("can't open service manager: {0}")]
    ManagerUnavailable(#[source] HostError),

    /// The service record could not be created.
    #[error("can't create service {name}: {source}")]
    ServiceCreateFailed {
        /// Service name.
        name: String,
        /// Underlying host error.
        #[source]
        source: HostError,
    },

    /// The service record does not exist (or cannot be opened).
    #[error("can't open service {name}: {source}")]
    ServiceNotFound {
        /// Service name.
        name: String,
        /// Underlying host error.
        #[source]
        source: HostError,
    },

    /// The service record could not be deleted.
    #[error("can't delete service {name}: {source}")]
    ServiceDeleteFailed {
        /// Service name.
        name: String,
        /// Underlying host error.
        #[source]
        source: HostError,
    },

    /// The diagnostic (event log) source entries could not be written.
    #[error("{name} is unable to create event source entries: {source}")]
    EventSourceFailed {
        /// Service name.
        name: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// Description or startup parameters could not be persisted.
    #[error("{name} is unable to persist startup parameters: {source}")]
    ParameterPersistFailed {
        /// Service name.
        name: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

impl RegistrationError {
    /// Returns true for failures of the service record itself
    /// (create, open or delete).
    #[must_use]
    pub const fn is_service_record_error(&self) -> bool {
        matches!(
            self,
            Self::ServiceCreateFailed { .. }
                | Self::ServiceNotFound { .. }
                | Self::ServiceDeleteFailed { .. }
        )
    }

    /// Returns true for failures writing persistent configuration.
    #[must_use]
    pub const fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            Self::EventSourceFailed { .. } | Self::ParameterPersistFailed { .. }
        )
    }

    /// Process exit status for this failure.
    ///
    /// 1: manager unavailable, 2: create failed, 3: persistent entries,
    /// 4: service cannot be opened, 5: delete failed.
    #[must_use]
    pub const fn exit_status(&self) -> i32 {
        match self {
            Self::ManagerUnavailable(_) => 1,
            Self::ServiceCreateFailed { .. } => 2,
            Self::EventSourceFailed { .. } | Self::ParameterPersistFailed { .. } => 3,
            Self::ServiceNotFound { .. } => 4,
            Self::ServiceDeleteFailed { .. } => 5,
        }
    }
}

// =============================================================================
// RuntimeError
// =============================================================================

/// Failure of the service runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The control handler could not be registered with the manager.
    #[error("control handler registration failed: {0}")]
    DispatchRegistration(#[source] HostError),

    /// The security context for the worker could not be constructed.
    #[error("couldn't init security context: {0}")]
    SecurityContext(String),

    /// The worker execution context could not be started.
    #[error("couldn't start worker thread: {0}")]
    WorkerSpawn(String),

    /// The async executor driving the state machine could not be built.
    #[error("executor error: {0}")]
    Executor(#[from] std::io::Error),

    /// The manager rejected dispatch (e.g. launched interactively).
    #[error("couldn't start service {name}: {source}")]
    DispatcherRejected {
        /// Service name.
        name: String,
        /// Underlying host error.
        #[source]
        source: HostError,
    },
}

impl RuntimeError {
    /// Creates a security context error.
    #[must_use]
    pub fn security_context(msg: impl Into<String>) -> Self {
        Self::SecurityContext(msg.into())
    }

    /// Creates a worker spawn error.
    #[must_use]
    pub fn worker_spawn(msg: impl Into<String>) -> Self {
        Self::WorkerSpawn(msg.into())
    }

    /// Returns true if the error occurs before the worker runs, meaning the
    /// process exits without executing the entry point.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DispatchRegistration(_)
                | Self::SecurityContext(_)
                | Self::WorkerSpawn(_)
                | Self::Executor(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_error_display() {
        let err = RegistrationError::ServiceCreateFailed {
            name: "ExampleAgent".to_string(),
            source: HostError::AlreadyExists("ExampleAgent".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "can't create service ExampleAgent: service already exists: ExampleAgent"
        );
    }

    #[test]
    fn test_service_record_classification() {
        let create = RegistrationError::ServiceCreateFailed {
            name: "a".to_string(),
            source: HostError::AlreadyExists("a".to_string()),
        };
        assert!(create.is_service_record_error());
        assert!(!create.is_persistence_error());

        let persist = RegistrationError::ParameterPersistFailed {
            name: "a".to_string(),
            source: StoreError::backend("write", "a\\Parameters", "denied"),
        };
        assert!(persist.is_persistence_error());
        assert!(!persist.is_service_record_error());

        let scm = RegistrationError::ManagerUnavailable(HostError::unavailable("no scm"));
        assert!(!scm.is_service_record_error());
    }

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(
            RegistrationError::ManagerUnavailable(HostError::unavailable("x")).exit_status(),
            1
        );
        assert_eq!(
            RegistrationError::ServiceNotFound {
                name: "x".to_string(),
                source: HostError::NotFound("x".to_string()),
            }
            .exit_status(),
            4
        );
    }

    #[test]
    fn test_runtime_error_fatal() {
        assert!(RuntimeError::security_context("null dacl").is_fatal());
        assert!(RuntimeError::DispatchRegistration(HostError::rejected("x")).is_fatal());
        let rejected = RuntimeError::DispatcherRejected {
            name: "svc".to_string(),
            source: HostError::rejected("not started by the manager"),
        };
        assert!(!rejected.is_fatal());
    }

    #[test]
    fn test_host_error_not_found() {
        assert!(HostError::NotFound("svc".to_string()).is_not_found());
        assert!(!HostError::unavailable("svc").is_not_found());
    }
}
