//! Hosts without a service control manager.
//!
//! Every service operation fails the way the SCM fails for a process it
//! did not start: registration reports the manager as unavailable and the
//! dispatcher rejects the start, which sends callers to console mode.

use svckeep_core::{
    ControlHandler, ControlHost, HostError, HostResult, ManagerConnection, ServiceDispatcher,
    ServiceMain, ServiceManager, StatusReporter,
};

/// Stand-in host manager for platforms without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableHost;

impl PortableHost {
    const REASON: &'static str = "no service control manager on this host";
}

impl ServiceManager for PortableHost {
    fn connect(&self) -> HostResult<Box<dyn ManagerConnection>> {
        Err(HostError::unavailable(Self::REASON))
    }
}

impl ServiceDispatcher for PortableHost {
    fn start(&self, service_name: &str, _service_main: ServiceMain) -> HostResult<()> {
        tracing::debug!(service = %service_name, "dispatcher start refused");
        Err(HostError::rejected(Self::REASON))
    }
}

impl ControlHost for PortableHost {
    fn register_control_handler(
        &self,
        _service_name: &str,
        _handler: ControlHandler,
    ) -> HostResult<Box<dyn StatusReporter>> {
        Err(HostError::unavailable(Self::REASON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_unavailable() {
        let err = PortableHost.connect().err();
        assert!(matches!(err, Some(HostError::Unavailable(_))));
    }

    #[test]
    fn test_dispatcher_rejects_without_calling_main() {
        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let result = PortableHost.start(
            "agent",
            Box::new(move |_args| flag.store(true, std::sync::atomic::Ordering::SeqCst)),
        );

        assert!(matches!(result, Err(HostError::Rejected(_))));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_control_handler_registration_fails() {
        let result = PortableHost.register_control_handler(
            "agent",
            Box::new(|_| svckeep_core::ControlResponse::Accepted),
        );
        assert!(result.is_err());
    }
}
