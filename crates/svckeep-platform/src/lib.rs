//! # svckeep-platform
//!
//! Host bindings for the svckeep service lifecycle core.
//!
//! On Windows every collaborator of `svckeep-core` is backed by the
//! operating system:
//!
//! - **SCM**: service records, the control dispatcher and status reports
//!   (`windows-service`)
//! - **Registry**: the key-value store behind startup parameters and the
//!   event source
//! - **Event log / message box**: the diagnostic sink backends
//! - **Threads**: worker threads created under a null-DACL security
//!   descriptor, with whole-thread suspend/resume/terminate
//!
//! Elsewhere, [`detect::backends`] falls back to a file store, a stderr
//! diagnostic router and a [`portable::PortableHost`] that refuses service
//! operations, so the binary still runs in console mode.
//!
//! ## Example
//!
//! ```rust,ignore
//! use svckeep_core::ServiceConfig;
//! use svckeep_platform::backends;
//!
//! let config = ServiceConfig::load("agent.toml")?;
//! let host = backends(&config);
//! println!("running on {}", host.host);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod detect;
pub mod portable;

#[cfg(windows)]
#[allow(unsafe_code)]
pub mod windows;

pub use detect::{Backends, Host, backends, default_store_path, detect_host, open_store};
pub use portable::PortableHost;
