//! Lifecycle test suite.
//!
//! Exercises the components together against in-process fakes of the host
//! manager, the store, the diagnostic sink and the entry point.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `lifecycle` | Service runtime start, run and stop |
//! | `control` | PAUSE / CONTINUE / INTERROGATE / STOP handling |
//! | `registration` | Register and unregister |
//! | `properties` | Property-based parameter and checkpoint checks |

pub mod properties;
pub mod registration;

pub use mocks::{FakeHost, FakeManager, RecordingSink};
