//! Register and unregister against the fake service manager.

use std::path::PathBuf;
use std::sync::Arc;

use crate::diagnostic::{Presentation, Severity};
use crate::error::RegistrationError;
use crate::event_source;
use crate::parameters::{DESCRIPTION_VALUE, ParameterStore};
use crate::registration::{Registration, RegistrationManager};
use crate::store::{KeyValueStore, MemoryStore, StoreValue};
use crate::tests::mocks::{FailingStore, FakeManager, Harness, RecordingSink};
use crate::types::{ServiceIdentity, ServiceState, StartType};
use crate::worker::WorkerContext;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn registration(name: &str, args: &[&str]) -> Registration {
    Registration {
        identity: ServiceIdentity::new(name),
        executable: PathBuf::from("C:\\Program Files\\Agent\\agent.exe"),
        service_flag: "-service".to_string(),
        start_type: StartType::Auto,
        startup_args: strings(args),
    }
}

struct Fixture {
    manager: FakeManager,
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    registrar: RegistrationManager,
}

fn fixture(manager: FakeManager) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let sink = RecordingSink::new();
    let registrar = RegistrationManager::new(Arc::new(manager.clone()), store.clone(), sink.clone());
    Fixture {
        manager,
        store,
        sink,
        registrar,
    }
}

/// Registering with args and no description stores exactly the args.
#[test]
fn register_persists_startup_args_only() {
    let f = fixture(FakeManager::new());
    f.registrar
        .register(&registration("ExampleAgent", &["-c", "/etc/example.conf"]), false)
        .unwrap();

    let params = f.store.snapshot("ExampleAgent\\Parameters").unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params["Param1"], StoreValue::String("-c".into()));
    assert_eq!(params["Param2"], StoreValue::String("/etc/example.conf".into()));
    assert!(f.store.read("ExampleAgent", DESCRIPTION_VALUE).unwrap().is_none());

    let record = f.manager.record("ExampleAgent").unwrap();
    assert_eq!(
        record.command_line(),
        "\"C:\\Program Files\\Agent\\agent.exe\" -service"
    );
    assert_eq!(record.start_type, StartType::Auto);

    let emitted = f.sink.emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].0.severity, Severity::Information);
    assert_eq!(emitted[0].0.text(), "ExampleAgent successfully registered as a service");
    assert_eq!(emitted[0].1, Presentation::Interactive);
    assert_eq!(f.manager.open_resources(), 0);
}

/// Event source entries point at the executable.
#[test]
fn register_installs_event_source() {
    let f = fixture(FakeManager::new());
    f.registrar.register(&registration("agent", &[]), true).unwrap();

    let source = f.store.snapshot(&event_source::source_namespace("agent")).unwrap();
    assert_eq!(
        source[event_source::MESSAGE_FILE_VALUE],
        StoreValue::ExpandString("C:\\Program Files\\Agent\\agent.exe".into())
    );
    assert_eq!(source[event_source::TYPES_SUPPORTED_VALUE], StoreValue::Dword(7));
    assert!(f.store.snapshot("agent\\Parameters").is_none());
}

/// A description is stored; quiet routes diagnostics to stderr.
#[test]
fn register_with_description_quiet() {
    let f = fixture(FakeManager::new());
    let mut reg = registration("agent", &[]);
    reg.identity = reg.identity.with_description("Example SNMP agent");
    f.registrar.register(&reg, true).unwrap();

    let params = ParameterStore::new(f.store.clone());
    assert_eq!(
        params.load_description(&reg.identity).as_deref(),
        Some("Example SNMP agent")
    );
    assert!(f.sink.emitted().iter().all(|(_, p)| *p == Presentation::Quiet));
}

/// A same-named service makes creation fail; nothing is persisted.
#[test]
fn register_duplicate_writes_nothing() {
    let f = fixture(FakeManager::new().with_service("ExampleAgent", ServiceState::Stopped));
    let err = f
        .registrar
        .register(&registration("ExampleAgent", &["-c", "/etc/example.conf"]), false)
        .unwrap_err();

    assert!(matches!(err, RegistrationError::ServiceCreateFailed { .. }));
    assert!(err.is_service_record_error());
    assert!(f.store.is_empty());
    assert!(f.sink.contains(Severity::Error, "Can't create service ExampleAgent"));
    assert_eq!(f.manager.open_resources(), 0);
}

/// An unreachable manager aborts registration.
#[test]
fn register_without_manager() {
    let f = fixture(FakeManager::unavailable());
    let err = f.registrar.register(&registration("agent", &["-x"]), true).unwrap_err();

    assert!(matches!(err, RegistrationError::ManagerUnavailable(_)));
    assert_eq!(err.exit_status(), 1);
    assert!(f.sink.contains(Severity::Error, "Can't open SCM (Service Control Manager)"));
    assert!(f.store.is_empty());
}

/// Event source failure is reported; parameters are not written.
#[test]
fn register_event_source_failure() {
    let store = FailingStore::failing_under("EventLog");
    let sink = RecordingSink::new();
    let manager = FakeManager::new();
    let registrar = RegistrationManager::new(Arc::new(manager.clone()), store.clone(), sink.clone());

    let err = registrar.register(&registration("agent", &["-x"]), false).unwrap_err();

    assert!(matches!(err, RegistrationError::EventSourceFailed { .. }));
    assert!(err.is_persistence_error());
    assert_eq!(store.writes(), 0);
    assert!(sink.contains(Severity::Error, "agent is unable to create registry entries"));
    assert_eq!(manager.open_resources(), 0);
}

/// Parameter write failure is fatal for registration.
#[test]
fn register_parameter_persist_failure() {
    let store = FailingStore::failing_under("Parameters");
    let sink = RecordingSink::new();
    let registrar = RegistrationManager::new(Arc::new(FakeManager::new()), store, sink.clone());

    let err = registrar.register(&registration("agent", &["-x"]), false).unwrap_err();

    assert!(matches!(err, RegistrationError::ParameterPersistFailed { .. }));
    assert_eq!(err.exit_status(), 3);
    assert!(!sink.contains(Severity::Information, "successfully registered"));
}

/// Unregistering twice: the second call reports ServiceNotFound and leaks
/// nothing.
#[test]
fn unregister_twice() {
    let f = fixture(FakeManager::new());
    f.registrar.register(&registration("agent", &["-x"]), true).unwrap();

    f.registrar.unregister("agent", true).unwrap();
    assert!(!f.manager.has_service("agent"));

    let err = f.registrar.unregister("agent", true).unwrap_err();
    assert!(matches!(err, RegistrationError::ServiceNotFound { .. }));
    assert_eq!(err.exit_status(), 4);
    assert!(f.sink.contains(Severity::Error, "Can't open service agent"));
    assert_eq!(f.manager.open_resources(), 0);
}

/// Unregister removes the event source and stored parameters.
#[test]
fn unregister_cleans_up_store() {
    let f = fixture(FakeManager::new());
    let mut reg = registration("agent", &["-x", "-y"]);
    reg.identity = reg.identity.with_description("desc");
    f.registrar.register(&reg, true).unwrap();
    assert!(!f.store.is_empty());

    f.registrar.unregister("agent", true).unwrap();

    assert!(f.store.is_empty());
    assert!(f.sink.contains(Severity::Information, "agent service deleted"));
}

/// Cleanup of an absent event source is not an error.
#[test]
fn unregister_without_event_source() {
    let f = fixture(FakeManager::new().with_service("legacy", ServiceState::Stopped));
    f.registrar.unregister("legacy", false).unwrap();
    assert!(!f.manager.has_service("legacy"));
}

/// A running or paused service is stopped before deletion.
#[test]
fn unregister_stops_active_service() {
    for state in [ServiceState::Running, ServiceState::Paused] {
        let f = fixture(FakeManager::new().with_service("agent", state));
        f.registrar.unregister("agent", true).unwrap();
        assert_eq!(f.manager.stop_calls(), 1);
        assert!(!f.manager.has_service("agent"));
    }

    let f = fixture(FakeManager::new().with_service("agent", ServiceState::Stopped));
    f.registrar.unregister("agent", true).unwrap();
    assert_eq!(f.manager.stop_calls(), 0);
}

/// A failed stop does not prevent deletion.
#[test]
fn unregister_stop_failure_still_deletes() {
    let f = fixture(
        FakeManager::new()
            .with_service("agent", ServiceState::Running)
            .failing_stop(),
    );
    f.registrar.unregister("agent", true).unwrap();
    assert_eq!(f.manager.stop_calls(), 1);
    assert!(!f.manager.has_service("agent"));
}

/// Unregister removes only what registration stored; values the service
/// manager keeps beside them survive, even if the service would not stop.
#[test]
fn unregister_leaves_manager_owned_values() {
    let f = fixture(
        FakeManager::new()
            .with_service("agent", ServiceState::Running)
            .failing_stop(),
    );
    let params = ParameterStore::new(f.store.clone());
    let id = ServiceIdentity::new("agent");
    params.save_parameters(&id, &strings(&["-x"])).unwrap();
    params.save_description(&id, "desc").unwrap();
    f.store
        .write("agent", "ImagePath", &StoreValue::String("\"agent.exe\" -service".into()))
        .unwrap();

    f.registrar.unregister("agent", true).unwrap();

    assert_eq!(
        f.store.read("agent", "ImagePath").unwrap(),
        Some(StoreValue::String("\"agent.exe\" -service".into()))
    );
    assert_eq!(f.store.read("agent", DESCRIPTION_VALUE).unwrap(), None);
    assert!(f.store.snapshot("agent\\Parameters").is_none());
}

/// Delete failure is reported and leaves the event source in place.
#[test]
fn unregister_delete_failure() {
    let f = fixture(FakeManager::new());
    f.registrar.register(&registration("agent", &[]), true).unwrap();
    let _ = f.manager.clone().failing_delete();

    let err = f.registrar.unregister("agent", false).unwrap_err();

    assert!(matches!(err, RegistrationError::ServiceDeleteFailed { .. }));
    assert!(f.sink.contains(Severity::Error, "Can't delete service agent"));
    assert!(f.store.snapshot(&event_source::source_namespace("agent")).is_some());
    assert_eq!(f.manager.open_resources(), 0);
}

/// Arguments given at registration reach the worker at service start.
#[test]
fn registered_args_reach_worker() {
    let h = Harness::new();
    let registrar = RegistrationManager::new(
        Arc::new(FakeManager::new()),
        h.store.clone(),
        RecordingSink::new(),
    );
    registrar
        .register(&registration("ExampleAgent", &["-c", "/etc/example.conf"]), true)
        .unwrap();

    let summary = h
        .runtime("ExampleAgent", Arc::new(|_ctx: WorkerContext| -> u32 { 0 }))
        .service_main(strings(&["ExampleAgent"]))
        .unwrap();

    assert_eq!(
        summary.argv,
        strings(&["ExampleAgent", "-c", "/etc/example.conf"])
    );
}
