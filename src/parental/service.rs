use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::parental::settings::SettingKind;
use crate::platform::ServiceBridge;

#[derive(Debug, Default)]
struct SupervisorState {
    needs: BTreeMap<SettingKind, bool>,
    running: bool,
    start_failed: bool,
}

impl SupervisorState {
    fn should_run(&self) -> bool {
        self.needs.values().any(|needed| *needed)
    }
}

/// Point-in-time view of the background service bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub start_failed: bool,
    pub needed_by: Vec<SettingKind>,
}

/// Keeps the shared background service alive exactly while some setting needs it
///
/// Each enforceable setting reports its own need. The service is started when
/// the first need appears and stopped when the last one goes away; repeated
/// reports that do not change the aggregate never reach the platform.
///
/// A failed start trips a sticky breaker: later needs leave the service down
/// until [`force_start`](Self::force_start) is called.
pub struct ServiceSupervisor {
    bridge: Arc<dyn ServiceBridge>,
    state: Mutex<SupervisorState>,
}

impl ServiceSupervisor {
    pub fn new(bridge: Arc<dyn ServiceBridge>) -> Self {
        Self {
            bridge,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    /// Adopt the platform's view of whether the service is already up
    pub async fn sync_with_platform(&self) {
        let mut state = self.state.lock().await;
        match self.bridge.is_service_running().await {
            Ok(running) => {
                debug!("Enforcement service running at startup: {}", running);
                state.running = running;
            }
            Err(e) => warn!("Error checking enforcement service status: {:#}", e),
        }
    }

    /// Record whether `component` currently needs the service, then start or
    /// stop it if the aggregate need changed
    pub async fn notify_need(&self, component: SettingKind, is_enforcing: bool) {
        let mut state = self.state.lock().await;
        state.needs.insert(component, is_enforcing);
        let should_run = state.should_run();

        if should_run && !state.running {
            if state.start_failed {
                warn!(
                    "Enforcement service needed by {} but a previous start failed; not retrying",
                    component
                );
            } else {
                match self.bridge.start_service().await {
                    Ok(()) => {
                        info!("Enforcement service started");
                        state.running = true;
                    }
                    Err(e) => {
                        error!("Error starting enforcement service: {:#}", e);
                        state.start_failed = true;
                    }
                }
            }
        } else if !should_run && state.running {
            match self.bridge.stop_service().await {
                Ok(()) => {
                    info!("Enforcement service stopped");
                    state.running = false;
                }
                Err(e) => error!("Error stopping enforcement service: {:#}", e),
            }
        }

        debug!(
            "{} enforcement {}, service needed: {}",
            component,
            if is_enforcing { "enabled" } else { "disabled" },
            should_run
        );
    }

    /// Clear the failure breaker and start the service now
    pub async fn force_start(&self) -> bool {
        let mut state = self.state.lock().await;
        state.start_failed = false;

        match self.bridge.start_service().await {
            Ok(()) => {
                info!("Enforcement service force-started");
                state.running = true;
                true
            }
            Err(e) => {
                error!("Error force-starting enforcement service: {:#}", e);
                state.start_failed = true;
                false
            }
        }
    }

    /// Stop the service regardless of outstanding needs
    pub async fn force_stop(&self) -> bool {
        let mut state = self.state.lock().await;

        match self.bridge.stop_service().await {
            Ok(()) => {
                info!("Enforcement service force-stopped");
                state.running = false;
                true
            }
            Err(e) => {
                error!("Error force-stopping enforcement service: {:#}", e);
                false
            }
        }
    }

    /// Ask the platform directly; errors read as not running
    pub async fn is_running(&self) -> bool {
        self.bridge.is_service_running().await.unwrap_or_else(|e| {
            error!("Error checking service status: {:#}", e);
            false
        })
    }

    pub async fn start_failed(&self) -> bool {
        self.state.lock().await.start_failed
    }

    pub async fn status(&self) -> ServiceStatus {
        let state = self.state.lock().await;
        ServiceStatus {
            running: state.running,
            start_failed: state.start_failed,
            needed_by: state
                .needs
                .iter()
                .filter(|(_, needed)| **needed)
                .map(|(kind, _)| *kind)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedService;

    fn make_supervisor() -> (ServiceSupervisor, Arc<SimulatedService>) {
        let service = Arc::new(SimulatedService::new());
        (ServiceSupervisor::new(service.clone()), service)
    }

    #[tokio::test]
    async fn test_starts_on_first_need_only() {
        let (supervisor, service) = make_supervisor();

        supervisor.notify_need(SettingKind::Volume, true).await;
        supervisor.notify_need(SettingKind::Volume, true).await;
        supervisor.notify_need(SettingKind::Brightness, true).await;

        assert!(service.is_running());
        assert_eq!(service.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_release_keeps_service() {
        let (supervisor, service) = make_supervisor();

        supervisor.notify_need(SettingKind::Volume, true).await;
        supervisor.notify_need(SettingKind::Brightness, true).await;
        supervisor.notify_need(SettingKind::Volume, false).await;

        assert!(service.is_running());
        assert_eq!(service.stop_calls(), 0);
        assert_eq!(supervisor.status().await.needed_by, vec![SettingKind::Brightness]);

        supervisor.notify_need(SettingKind::Brightness, false).await;
        assert!(!service.is_running());
        assert_eq!(service.stop_calls(), 1);

        // Releasing again is not an edge
        supervisor.notify_need(SettingKind::Brightness, false).await;
        assert_eq!(service.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_stop_when_never_started() {
        let (supervisor, service) = make_supervisor();

        supervisor.notify_need(SettingKind::ScreenTime, false).await;
        assert_eq!(service.stop_calls(), 0);
        assert_eq!(service.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_is_sticky() {
        let (supervisor, service) = make_supervisor();
        service.set_fail_start(true);

        supervisor.notify_need(SettingKind::Volume, true).await;
        assert!(supervisor.start_failed().await);
        assert_eq!(service.start_calls(), 1);

        // Toggling needs does not retry, even after the platform recovers
        service.set_fail_start(false);
        supervisor.notify_need(SettingKind::Volume, false).await;
        supervisor.notify_need(SettingKind::Volume, true).await;
        supervisor.notify_need(SettingKind::Brightness, true).await;
        assert_eq!(service.start_calls(), 1);
        assert!(!service.is_running());

        assert!(supervisor.force_start().await);
        assert!(!supervisor.start_failed().await);
        assert!(service.is_running());
        assert_eq!(service.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_force_start_failure_rearms_breaker() {
        let (supervisor, service) = make_supervisor();
        service.set_fail_start(true);

        assert!(!supervisor.force_start().await);
        assert!(supervisor.start_failed().await);
    }

    #[tokio::test]
    async fn test_force_stop_then_need_restarts() {
        let (supervisor, service) = make_supervisor();

        supervisor.notify_need(SettingKind::Volume, true).await;
        assert!(supervisor.force_stop().await);
        assert!(!service.is_running());

        supervisor.notify_need(SettingKind::Volume, true).await;
        assert!(service.is_running());
        assert_eq!(service.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_sync_with_platform_adopts_running_service() {
        let (supervisor, service) = make_supervisor();
        service.start_service().await.unwrap();

        supervisor.sync_with_platform().await;
        supervisor.notify_need(SettingKind::Volume, true).await;
        assert_eq!(service.start_calls(), 1);

        supervisor.notify_need(SettingKind::Volume, false).await;
        assert!(!service.is_running());
    }
}
