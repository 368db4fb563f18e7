//! Event log source configuration.
//!
//! The event log resolves message text through the source's
//! `EventMessageFile`, which names the executable. The source is installed
//! under the service name, and diagnostics must be reported under that
//! same name.

use std::path::Path;

use crate::diagnostic::Severity;
use crate::error::StoreResult;
use crate::store::{KeyValueStore, StoreValue, namespace};

/// Value naming the message file.
pub const MESSAGE_FILE_VALUE: &str = "EventMessageFile";

/// Value holding the supported entry types.
pub const TYPES_SUPPORTED_VALUE: &str = "TypesSupported";

/// Namespace of the event source for `service_name`.
#[must_use]
pub fn source_namespace(service_name: &str) -> String {
    namespace(&["EventLog", "Application", service_name])
}

/// Registers `service_name` as an event source whose messages are resolved
/// from `message_file`.
pub fn install(store: &dyn KeyValueStore, service_name: &str, message_file: &Path) -> StoreResult<()> {
    let ns = source_namespace(service_name);
    store.write(
        &ns,
        MESSAGE_FILE_VALUE,
        &StoreValue::ExpandString(message_file.display().to_string()),
    )?;
    store.write(
        &ns,
        TYPES_SUPPORTED_VALUE,
        &StoreValue::Dword(Severity::supported_types_mask()),
    )?;
    tracing::debug!(service = %service_name, "installed event source");
    Ok(())
}

/// Removes the event source. Removing an absent source is not an error.
pub fn remove(store: &dyn KeyValueStore, service_name: &str) -> StoreResult<bool> {
    store.remove_namespace(&source_namespace(service_name))
}
