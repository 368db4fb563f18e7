//! Registration manager: installs and removes the service record.
//!
//! Every failure is reported through the diagnostic sink before it is
//! returned. Connections and handles are released by drop on every path,
//! so a failed step leaves nothing open; earlier steps are not undone.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::diagnostic::{Diagnostic, DiagnosticSink, Presentation};
use crate::error::RegistrationError;
use crate::event_source;
use crate::host::{ServiceManager, ServiceRecord};
use crate::parameters::ParameterStore;
use crate::store::KeyValueStore;
use crate::types::{ServiceIdentity, StartType};

/// What to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Service identity, including the optional description.
    pub identity: ServiceIdentity,
    /// Executable the manager starts.
    pub executable: PathBuf,
    /// Flag passed to the executable to enter service mode.
    pub service_flag: String,
    /// Start type.
    pub start_type: StartType,
    /// Startup arguments replayed on every start.
    pub startup_args: Vec<String>,
}

impl Registration {
    /// Builds a registration from configuration.
    ///
    /// `description` overrides the configured description.
    ///
    /// # Errors
    /// Returns an error if the executable path cannot be determined.
    pub fn from_config(
        config: &ServiceConfig,
        description: Option<String>,
        startup_args: Vec<String>,
    ) -> std::io::Result<Self> {
        let mut identity = config.identity();
        if description.is_some() {
            identity.description = description;
        }
        Ok(Self {
            identity,
            executable: config.executable_path()?,
            service_flag: config.service_flag.clone(),
            start_type: config.start_type,
            startup_args,
        })
    }

    /// Service record to create.
    #[must_use]
    pub fn record(&self) -> ServiceRecord {
        ServiceRecord {
            name: self.identity.name.clone(),
            display_name: self.identity.display_name.clone(),
            executable: self.executable.clone(),
            launch_arguments: vec![self.service_flag.clone()],
            start_type: self.start_type,
        }
    }
}

/// Registers and unregisters services.
pub struct RegistrationManager {
    manager: Arc<dyn ServiceManager>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn DiagnosticSink>,
}

impl RegistrationManager {
    /// Creates a registration manager.
    #[must_use]
    pub fn new(
        manager: Arc<dyn ServiceManager>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self { manager, store, sink }
    }

    /// Registers the service.
    ///
    /// Creates the service record, installs the event source, then persists
    /// the description and startup arguments if any were given.
    ///
    /// # Errors
    /// - [`RegistrationError::ManagerUnavailable`]
    /// - [`RegistrationError::ServiceCreateFailed`] (nothing is persisted)
    /// - [`RegistrationError::EventSourceFailed`]
    /// - [`RegistrationError::ParameterPersistFailed`]
    pub fn register(&self, registration: &Registration, quiet: bool) -> Result<(), RegistrationError> {
        let presentation = Presentation::for_cli(quiet);
        let identity = &registration.identity;
        let name = identity.name.as_str();

        let connection = self.manager.connect().map_err(|e| {
            self.sink.emit(
                &Diagnostic::error("Can't open SCM (Service Control Manager)").with_os_error(&e),
                presentation,
            );
            RegistrationError::ManagerUnavailable(e)
        })?;

        let record = registration.record();
        tracing::debug!(service = %name, command = %record.command_line(), "creating service record");
        let _service = connection.create_service(&record).map_err(|e| {
            self.sink.emit(
                &Diagnostic::error(format!("Can't create service {name}")).with_os_error(&e),
                presentation,
            );
            RegistrationError::ServiceCreateFailed {
                name: name.to_string(),
                source: e,
            }
        })?;

        event_source::install(self.store.as_ref(), name, &registration.executable).map_err(|e| {
            self.sink.emit(
                &Diagnostic::error(format!("{name} is unable to create registry entries")).with_os_error(&e),
                presentation,
            );
            RegistrationError::EventSourceFailed {
                name: name.to_string(),
                source: e,
            }
        })?;

        let params = ParameterStore::new(Arc::clone(&self.store));
        let persisted = identity
            .description
            .as_deref()
            .map_or(Ok(()), |text| params.save_description(identity, text))
            .and_then(|()| {
                if registration.startup_args.is_empty() {
                    Ok(())
                } else {
                    params.save_parameters(identity, &registration.startup_args)
                }
            });
        persisted.map_err(|e| {
            self.sink.emit(
                &Diagnostic::error(format!("{name} is unable to create registry entries")).with_os_error(&e),
                presentation,
            );
            RegistrationError::ParameterPersistFailed {
                name: name.to_string(),
                source: e,
            }
        })?;

        self.sink.emit(
            &Diagnostic::info(format!("{name} successfully registered as a service")),
            presentation,
        );
        Ok(())
    }

    /// Unregisters the service.
    ///
    /// A running or paused service is asked to stop first; failing to stop
    /// it does not prevent deletion. The event source, the stored arguments
    /// and the description are removed afterwards, ignoring absence; the
    /// service record's own key is left to the service manager.
    ///
    /// # Errors
    /// - [`RegistrationError::ManagerUnavailable`]
    /// - [`RegistrationError::ServiceNotFound`]
    /// - [`RegistrationError::ServiceDeleteFailed`]
    pub fn unregister(&self, service_name: &str, quiet: bool) -> Result<(), RegistrationError> {
        let presentation = Presentation::for_cli(quiet);

        let connection = self.manager.connect().map_err(|e| {
            self.sink.emit(
                &Diagnostic::error("Can't open SCM (Service Control Manager)").with_os_error(&e),
                presentation,
            );
            RegistrationError::ManagerUnavailable(e)
        })?;

        let service = connection.open_service(service_name).map_err(|e| {
            self.sink.emit(
                &Diagnostic::error(format!("Can't open service {service_name}")).with_os_error(&e),
                presentation,
            );
            RegistrationError::ServiceNotFound {
                name: service_name.to_string(),
                source: e,
            }
        })?;

        match service.query_state() {
            Ok(state) if state.needs_stop_before_delete() => {
                tracing::info!(service = %service_name, %state, "stopping service before delete");
                if let Err(e) = service.stop() {
                    tracing::warn!(service = %service_name, error = %e, "stop before delete failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(service = %service_name, error = %e, "service state unavailable"),
        }

        service.delete().map_err(|e| {
            self.sink.emit(
                &Diagnostic::error(format!("Can't delete service {service_name}")),
                presentation,
            );
            RegistrationError::ServiceDeleteFailed {
                name: service_name.to_string(),
                source: e,
            }
        })?;
        drop(service);

        self.sink.emit(
            &Diagnostic::info(format!("{service_name} service deleted")),
            presentation,
        );

        if let Err(e) = event_source::remove(self.store.as_ref(), service_name) {
            tracing::warn!(service = %service_name, error = %e, "event source cleanup failed");
        }
        let params = ParameterStore::new(Arc::clone(&self.store));
        if let Err(e) = params.clear(&ServiceIdentity::new(service_name)) {
            tracing::warn!(service = %service_name, error = %e, "parameter cleanup failed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_runs_executable_with_service_flag() {
        let registration = Registration {
            identity: ServiceIdentity::new("ExampleAgent").with_display_name("Example Agent"),
            executable: PathBuf::from("C:\\agent\\agent.exe"),
            service_flag: "-service".to_string(),
            start_type: StartType::Auto,
            startup_args: vec!["-c".to_string()],
        };
        let record = registration.record();
        assert_eq!(record.display_name, "Example Agent");
        assert_eq!(record.launch_arguments, vec!["-service".to_string()]);
        assert_eq!(record.command_line(), "\"C:\\agent\\agent.exe\" -service");
    }

    #[test]
    fn test_from_config_description_override() {
        let mut config = ServiceConfig::new("agent");
        config.description = Some("configured".to_string());
        config.executable = Some(PathBuf::from("/opt/agent"));

        let kept = Registration::from_config(&config, None, vec![]).unwrap();
        assert_eq!(kept.identity.description.as_deref(), Some("configured"));

        let overridden =
            Registration::from_config(&config, Some("from cli".to_string()), vec!["-x".to_string()])
                .unwrap();
        assert_eq!(overridden.identity.description.as_deref(), Some("from cli"));
        assert_eq!(overridden.startup_args, vec!["-x".to_string()]);
        assert_eq!(overridden.executable, PathBuf::from("/opt/agent"));
    }
}
