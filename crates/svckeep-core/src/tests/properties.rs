//! Property-based checks of the parameter bridge and the status tracker.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use crate::error::HostResult;
use crate::host::StatusReporter;
use crate::parameters::ParameterStore;
use crate::status::StatusTracker;
use crate::store::{FileStore, MemoryStore};
use crate::types::{ServiceIdentity, ServiceState, ServiceStatus, StartupParameters};

struct Discard;

impl StatusReporter for Discard {
    fn report(&self, _status: &ServiceStatus) -> HostResult<()> {
        Ok(())
    }
}

fn pending_state() -> impl Strategy<Value = ServiceState> {
    prop_oneof![
        Just(ServiceState::StartPending),
        Just(ServiceState::PausePending),
        Just(ServiceState::Paused),
        Just(ServiceState::ContinuePending),
        Just(ServiceState::StopPending),
    ]
}

proptest! {
    /// Any non-empty argument list reads back exactly, in order.
    #[test]
    fn saved_parameters_load_back(args in prop::collection::vec(".{0,40}", 1..12)) {
        let params = ParameterStore::new(Arc::new(MemoryStore::new()));
        let id = ServiceIdentity::new("svc");
        params.save_parameters(&id, &args).unwrap();
        prop_assert_eq!(params.load_parameters(&id), args);
    }

    /// Overwriting with any list leaves exactly that list.
    #[test]
    fn overwrite_replaces_previous(
        first in prop::collection::vec("[a-z-]{1,8}", 0..10),
        second in prop::collection::vec("[a-z-]{1,8}", 0..10),
    ) {
        let params = ParameterStore::new(Arc::new(MemoryStore::new()));
        let id = ServiceIdentity::new("svc");
        params.save_parameters(&id, &first).unwrap();
        params.save_parameters(&id, &second).unwrap();
        prop_assert_eq!(params.load_parameters(&id), second);
    }

    /// Checkpoints strictly increase across transitions that do not enter
    /// RUNNING or STOPPED.
    #[test]
    fn checkpoints_increase_outside_resets(
        states in prop::collection::vec(pending_state(), 1..20),
        heartbeats in prop::collection::vec(any::<bool>(), 20),
    ) {
        let mut tracker = StatusTracker::new("svc", Box::new(Discard), Duration::from_secs(1));
        let mut last = None;
        for (state, beat) in states.into_iter().zip(heartbeats) {
            let mut checkpoint = tracker.transition(state).checkpoint;
            if beat {
                if let Some(status) = tracker.heartbeat() {
                    prop_assert!(status.checkpoint > checkpoint);
                    checkpoint = status.checkpoint;
                }
            }
            if let Some(previous) = last {
                prop_assert!(checkpoint > previous);
            }
            last = Some(checkpoint);
        }
    }

    /// Rebuilt argv is argv[0] followed by the stored list.
    #[test]
    fn reconstruct_prefixes_manager_argv0(
        manager in prop::collection::vec("[a-zA-Z]{1,8}", 1..4),
        stored in prop::collection::vec("[a-z/.-]{1,12}", 1..6),
    ) {
        let argv = StartupParameters::reconstruct(manager.clone(), stored.clone(), "fallback").into_vec();
        prop_assert_eq!(&argv[0], &manager[0]);
        prop_assert_eq!(&argv[1..], stored.as_slice());
    }
}

/// The file store round-trips parameters across instances.
#[test]
fn file_store_round_trip_across_instances() {
    let path = std::env::temp_dir().join(format!("svckeep-props-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let id = ServiceIdentity::new("ExampleAgent");
    let args = vec!["-c".to_string(), "/etc/example.conf".to_string()];

    ParameterStore::new(Arc::new(FileStore::new(&path)))
        .save_parameters(&id, &args)
        .unwrap();
    let loaded = ParameterStore::new(Arc::new(FileStore::new(&path))).load_parameters(&id);

    assert_eq!(loaded, args);
    let _ = std::fs::remove_file(&path);
}
