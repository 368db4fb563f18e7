//! Control dispatcher.
//!
//! Invoked by the host manager on its own thread for every control request.
//! The dispatcher never touches the worker or the status itself: it checks
//! the request against the published state and forwards it to the runtime,
//! which performs the transition.

use tokio::sync::mpsc::UnboundedSender;

use crate::host::{ControlHandler, ControlResponse};
use crate::status::StateCell;
use crate::types::{ControlCode, ServiceState};

/// Maps host control codes to runtime requests.
#[derive(Debug, Clone)]
pub struct ControlDispatcher {
    service: String,
    state: StateCell,
    requests: UnboundedSender<ControlCode>,
}

impl ControlDispatcher {
    /// Creates a dispatcher observing `state` and forwarding to `requests`.
    #[must_use]
    pub fn new(service: impl Into<String>, state: StateCell, requests: UnboundedSender<ControlCode>) -> Self {
        Self {
            service: service.into(),
            state,
            requests,
        }
    }

    /// Handles one control request.
    ///
    /// | code | forwarded when |
    /// |---|---|
    /// | STOP | not already stopping or stopped |
    /// | PAUSE | RUNNING |
    /// | CONTINUE | PAUSED |
    /// | INTERROGATE | always |
    ///
    /// Anything else is [`ControlResponse::Ignored`].
    pub fn on_control(&self, code: ControlCode) -> ControlResponse {
        let state = self.state.load();
        let applies = match code {
            ControlCode::Stop => !matches!(state, ServiceState::StopPending | ServiceState::Stopped),
            ControlCode::Pause => state == ServiceState::Running,
            ControlCode::Continue => state == ServiceState::Paused,
            ControlCode::Interrogate => true,
        };
        if !applies {
            tracing::debug!(service = %self.service, ?code, %state, "control ignored in current state");
            return ControlResponse::Ignored;
        }

        match self.requests.send(code) {
            Ok(()) => {
                tracing::debug!(service = %self.service, ?code, %state, "control forwarded");
                ControlResponse::Accepted
            }
            Err(_) => ControlResponse::Closed,
        }
    }

    /// Handles a raw host control code.
    pub fn on_raw(&self, raw: u32) -> ControlResponse {
        match ControlCode::from_raw(raw) {
            Some(code) => self.on_control(code),
            None => {
                tracing::debug!(service = %self.service, raw, "unsupported control code");
                ControlResponse::NotImplemented
            }
        }
    }

    /// Wraps the dispatcher as a host control handler.
    #[must_use]
    pub fn into_handler(self) -> ControlHandler {
        Box::new(move |code| self.on_control(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dispatcher(state: ServiceState) -> (ControlDispatcher, mpsc::UnboundedReceiver<ControlCode>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ControlDispatcher::new("svc", StateCell::new(state), tx), rx)
    }

    #[test]
    fn test_pause_only_from_running() {
        let (d, mut rx) = dispatcher(ServiceState::Running);
        assert_eq!(d.on_control(ControlCode::Pause), ControlResponse::Accepted);
        assert_eq!(rx.try_recv().unwrap(), ControlCode::Pause);

        let (d, mut rx) = dispatcher(ServiceState::Paused);
        assert_eq!(d.on_control(ControlCode::Pause), ControlResponse::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_continue_while_running_is_noop() {
        let (d, mut rx) = dispatcher(ServiceState::Running);
        assert_eq!(d.on_control(ControlCode::Continue), ControlResponse::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_forwarded_unless_stopping() {
        for state in [ServiceState::Running, ServiceState::Paused, ServiceState::StartPending] {
            let (d, mut rx) = dispatcher(state);
            assert_eq!(d.on_control(ControlCode::Stop), ControlResponse::Accepted);
            assert_eq!(rx.try_recv().unwrap(), ControlCode::Stop);
        }
        for state in [ServiceState::StopPending, ServiceState::Stopped] {
            let (d, _rx) = dispatcher(state);
            assert_eq!(d.on_control(ControlCode::Stop), ControlResponse::Ignored);
        }
    }

    #[test]
    fn test_interrogate_always_forwarded() {
        for state in ServiceState::ALL {
            let (d, mut rx) = dispatcher(state);
            assert_eq!(d.on_control(ControlCode::Interrogate), ControlResponse::Accepted);
            assert_eq!(rx.try_recv().unwrap(), ControlCode::Interrogate);
        }
    }

    #[test]
    fn test_unknown_raw_code() {
        let (d, _rx) = dispatcher(ServiceState::Running);
        assert_eq!(d.on_raw(0x0000_0005), ControlResponse::NotImplemented);
        assert_eq!(d.on_raw(1), ControlResponse::Accepted);
    }

    #[test]
    fn test_closed_after_runtime_exit() {
        let (d, rx) = dispatcher(ServiceState::Running);
        drop(rx);
        assert_eq!(d.on_control(ControlCode::Stop), ControlResponse::Closed);
    }

    #[test]
    fn test_handler_follows_state_cell() {
        struct Silent;
        impl crate::host::StatusReporter for Silent {
            fn report(&self, _: &crate::types::ServiceStatus) -> crate::error::HostResult<()> {
                Ok(())
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = crate::status::StatusTracker::new(
            "svc",
            Box::new(Silent),
            std::time::Duration::from_secs(1),
        );
        let handler = ControlDispatcher::new("svc", tracker.cell(), tx).into_handler();
        assert_eq!(handler(ControlCode::Pause), ControlResponse::Ignored);

        tracker.transition(ServiceState::Running);
        assert_eq!(handler(ControlCode::Pause), ControlResponse::Accepted);
        assert_eq!(rx.try_recv().unwrap(), ControlCode::Pause);
    }

    #[tokio::test]
    async fn test_requests_arrive_in_order() {
        let (d, mut rx) = dispatcher(ServiceState::Running);
        let handler = d.into_handler();
        let sender = std::thread::spawn(move || {
            for code in [ControlCode::Interrogate, ControlCode::Pause, ControlCode::Stop] {
                handler(code);
            }
        });

        assert_eq!(rx.recv().await, Some(ControlCode::Interrogate));
        assert_eq!(rx.recv().await, Some(ControlCode::Pause));
        assert_eq!(rx.recv().await, Some(ControlCode::Stop));
        sender.join().unwrap();
    }
}
