//! Windows backends.

mod eventlog;
mod registry;
mod scm;
mod thread;

pub use eventlog::{EVENT_ID, EventLog, MessageBox};
pub use registry::{RegistryStore, SERVICES_ROOT};
pub use scm::{ScmControlHost, ScmDispatcher, ScmManager, ScmStatusReporter};
pub use thread::{NativeThread, ScmSpawner};

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

/// Encodes `s` as a NUL-terminated UTF-16 string.
fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn win_io(err: &::windows::core::Error) -> std::io::Error {
    std::io::Error::other(err.to_string())
}
