use std::sync::Arc;

use apnsmock_contracts::Rejection;
use arc_swap::ArcSwapOption;

/// Simulated outage. While a rejection is installed every request on every
/// route gets it, before any parsing or response delay.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    slot: Arc<ArcSwapOption<Rejection>>,
}

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, status: u16, reason: impl Into<String>) {
        let rejection = Rejection::custom(status, reason);
        tracing::info!(status = rejection.status, reason = %rejection.reason, "fault installed");
        self.slot.store(Some(Arc::new(rejection)));
    }

    pub fn clear(&self) {
        if self.slot.swap(None).is_some() {
            tracing::info!("fault cleared");
        }
    }

    pub fn current(&self) -> Option<Arc<Rejection>> {
        self.slot.load_full()
    }

    pub fn is_installed(&self) -> bool {
        self.slot.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_clear() {
        let fault = FaultSwitch::new();
        assert!(fault.current().is_none());

        fault.install(503, "Shutdown");
        let current = fault.current().expect("fault installed");
        assert_eq!(current.status, 503);
        assert_eq!(current.reason(), "Shutdown");

        fault.clear();
        assert!(!fault.is_installed());
        fault.clear();
        assert!(fault.current().is_none());
    }

    #[test]
    fn clones_share_the_slot() {
        let fault = FaultSwitch::new();
        let observer = fault.clone();

        fault.install(500, "InternalServerError");
        assert!(observer.is_installed());

        observer.install(429, "TooManyRequests");
        assert_eq!(fault.current().map(|r| r.status), Some(429));
    }

    #[test]
    fn visible_across_threads_immediately() {
        let fault = FaultSwitch::new();
        let writer = fault.clone();
        std::thread::spawn(move || writer.install(503, "ServiceUnavailable"))
            .join()
            .expect("writer thread");
        assert_eq!(
            fault.current().map(|r| r.reason().to_string()),
            Some("ServiceUnavailable".to_string())
        );
    }
}
