//! Backend selection.
//!
//! Picks the collaborators for the current host: the SCM, registry and
//! event log on Windows, the portable fallback (file store, stderr
//! diagnostics, no service manager) everywhere else.

use std::path::PathBuf;
use std::sync::Arc;

use svckeep_core::{
    ControlHost, DiagnosticRouter, DiagnosticSink, FileStore, KeyValueStore, MemoryStore,
    ServiceConfig, ServiceDispatcher, ServiceManager, StoreConfig, WorkerSpawner,
};

#[cfg(not(windows))]
use crate::portable::PortableHost;
#[cfg(not(windows))]
use svckeep_core::ThreadSpawner;

/// Kind of host service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Host {
    /// Windows Service Control Manager.
    WindowsScm,
    /// No service manager; console mode only.
    Portable,
}

impl Host {
    /// Returns the host name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::WindowsScm => "windows-scm",
            Self::Portable => "portable",
        }
    }

    /// Returns true if services can be registered and dispatched.
    #[must_use]
    pub const fn has_service_manager(&self) -> bool {
        matches!(self, Self::WindowsScm)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detects the host service manager.
#[must_use]
pub const fn detect_host() -> Host {
    if cfg!(windows) {
        Host::WindowsScm
    } else {
        Host::Portable
    }
}

/// Collaborators wired for the current host.
pub struct Backends {
    /// Detected host.
    pub host: Host,
    /// Administrative side of the service manager.
    pub manager: Arc<dyn ServiceManager>,
    /// Service dispatcher.
    pub dispatcher: Arc<dyn ServiceDispatcher>,
    /// Control handler registration.
    pub control_host: Arc<dyn ControlHost>,
    /// Worker thread spawner.
    pub spawner: Arc<dyn WorkerSpawner>,
    /// Persistent key-value store.
    pub store: Arc<dyn KeyValueStore>,
    /// Operator-facing diagnostics.
    pub sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Builds the collaborators for `config` on the detected host.
#[must_use]
pub fn backends(config: &ServiceConfig) -> Backends {
    let host = detect_host();
    let store = open_store(config);
    tracing::debug!(%host, service = %config.name, "selected host backends");

    #[cfg(windows)]
    {
        use crate::windows::{EventLog, MessageBox, ScmControlHost, ScmDispatcher, ScmManager, ScmSpawner};

        let sink = router(config)
            .with_event_log(Arc::new(EventLog))
            .with_popup(Arc::new(MessageBox));
        Backends {
            host,
            manager: Arc::new(ScmManager),
            dispatcher: Arc::new(ScmDispatcher),
            control_host: Arc::new(ScmControlHost),
            spawner: Arc::new(ScmSpawner),
            store,
            sink: Arc::new(sink),
        }
    }

    #[cfg(not(windows))]
    {
        Backends {
            host,
            manager: Arc::new(PortableHost),
            dispatcher: Arc::new(PortableHost),
            control_host: Arc::new(PortableHost),
            spawner: Arc::new(ThreadSpawner),
            store,
            sink: Arc::new(router(config)),
        }
    }
}

/// Diagnostic router attributed to the installed event source.
///
/// Registration installs the source under the service name, so that name is
/// used here too; the display name only titles pop-ups.
fn router(config: &ServiceConfig) -> DiagnosticRouter {
    let router = DiagnosticRouter::new(config.name.as_str());
    match &config.display_name {
        Some(title) => router.with_title(title.as_str()),
        None => router,
    }
}

/// Opens the key-value store named by `config.store`.
///
/// The registry is only available on Windows; elsewhere a `registry`
/// setting falls back to a file store at [`default_store_path`].
#[must_use]
pub fn open_store(config: &ServiceConfig) -> Arc<dyn KeyValueStore> {
    match &config.store {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::File { path } => Arc::new(FileStore::new(path)),
        StoreConfig::Registry => registry_store(config),
    }
}

#[cfg(windows)]
fn registry_store(_config: &ServiceConfig) -> Arc<dyn KeyValueStore> {
    Arc::new(crate::windows::RegistryStore::services())
}

#[cfg(not(windows))]
fn registry_store(config: &ServiceConfig) -> Arc<dyn KeyValueStore> {
    let path = default_store_path(&config.name);
    tracing::info!(path = %path.display(), "registry unavailable, using file store");
    Arc::new(FileStore::new(path))
}

/// File store location for `service_name`: next to the executable, or in
/// the temporary directory if the executable path is unknown.
#[must_use]
pub fn default_store_path(service_name: &str) -> PathBuf {
    let file = format!("{service_name}.store.json");
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file)))
        .unwrap_or_else(|| std::env::temp_dir().join(file))
}
