use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{LevelBridge, PlatformBridges, ScreenTimeBridge, ServiceBridge};

/// In-memory stand-in for a phone's volume, brightness, screen-time and
/// foreground-service hooks
///
/// Every part counts its calls and can be told to fail, which is what the
/// coordinator tests and the CLI `run` loop rely on.
#[derive(Clone)]
pub struct SimulatedDevice {
    pub volume: Arc<SimulatedLevel>,
    pub brightness: Arc<SimulatedLevel>,
    pub screen_time: Arc<SimulatedScreenTime>,
    pub service: Arc<SimulatedService>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            volume: Arc::new(SimulatedLevel::new("volume", 50)),
            brightness: Arc::new(SimulatedLevel::new("brightness", 50)),
            screen_time: Arc::new(SimulatedScreenTime::new()),
            service: Arc::new(SimulatedService::new()),
        }
    }

    pub fn bridges(&self) -> PlatformBridges {
        PlatformBridges {
            volume: self.volume.clone(),
            brightness: self.brightness.clone(),
            screen_time: self.screen_time.clone(),
            service: self.service.clone(),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy)]
struct LevelState {
    value: u32,
    enforced: Option<u32>,
}

/// A simulated percentage level (volume or brightness)
#[derive(Debug)]
pub struct SimulatedLevel {
    name: &'static str,
    state: Mutex<LevelState>,
    fail_start: AtomicBool,
    fail_get: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl SimulatedLevel {
    pub fn new(name: &'static str, initial: u32) -> Self {
        Self {
            name,
            state: Mutex::new(LevelState {
                value: initial.min(100),
                enforced: None,
            }),
            fail_start: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Current level without going through the bridge
    pub fn current(&self) -> u32 {
        lock(&self.state).value
    }

    /// Target currently held, if enforcing
    pub fn enforced_target(&self) -> Option<u32> {
        lock(&self.state).enforced
    }

    /// Re-apply the enforced target, as the real enforcement loop does after
    /// the user moves a slider or presses a hardware key
    pub fn reassert(&self) -> bool {
        let mut state = lock(&self.state);
        match state.enforced {
            Some(target) if state.value != target => {
                state.value = target;
                true
            }
            _ => false,
        }
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LevelBridge for SimulatedLevel {
    async fn set_value(&self, percent: u32) -> Result<()> {
        lock(&self.state).value = percent.min(100);
        debug!("[sim] {} set to {}%", self.name, percent.min(100));
        Ok(())
    }

    async fn get_value(&self) -> Result<u32> {
        if self.fail_get.load(Ordering::SeqCst) {
            anyhow::bail!("simulated {} read failure", self.name);
        }
        Ok(lock(&self.state).value)
    }

    async fn start_enforcing(&self, percent: u32) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("simulated {} enforcement failure", self.name);
        }

        let mut state = lock(&self.state);
        state.value = percent.min(100);
        state.enforced = Some(percent.min(100));
        debug!("[sim] {} enforcing {}%", self.name, percent);
        Ok(())
    }

    async fn stop_enforcing(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).enforced = None;
        debug!("[sim] {} enforcement stopped", self.name);
        Ok(())
    }

    async fn is_enforcing(&self) -> Result<bool> {
        Ok(lock(&self.state).enforced.is_some())
    }
}

/// A simulated screen-time counter with an overlay permission switch
#[derive(Debug)]
pub struct SimulatedScreenTime {
    usage_seconds: AtomicU64,
    limit_seconds: Mutex<Option<u64>>,
    overlay_granted: AtomicBool,
    grant_on_request: AtomicBool,
    fail_start: AtomicBool,
    start_calls: AtomicUsize,
}

impl SimulatedScreenTime {
    pub fn new() -> Self {
        Self {
            usage_seconds: AtomicU64::new(0),
            limit_seconds: Mutex::new(None),
            overlay_granted: AtomicBool::new(true),
            grant_on_request: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_overlay_granted(&self, granted: bool) {
        self.overlay_granted.store(granted, Ordering::SeqCst);
    }

    /// Whether a permission request will be accepted by the "user"
    pub fn set_grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Count `seconds` of foreground usage, only while enforcing
    pub fn add_usage(&self, seconds: u64) {
        if lock(&self.limit_seconds).is_some() {
            self.usage_seconds.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    pub fn limit_seconds(&self) -> Option<u64> {
        *lock(&self.limit_seconds)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedScreenTime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenTimeBridge for SimulatedScreenTime {
    async fn get_daily_usage_seconds(&self) -> Result<u64> {
        Ok(self.usage_seconds.load(Ordering::SeqCst))
    }

    async fn start_enforcing(&self, limit_seconds: u64) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("simulated screen time enforcement failure");
        }

        *lock(&self.limit_seconds) = Some(limit_seconds);
        self.usage_seconds.store(0, Ordering::SeqCst);
        debug!("[sim] screen time enforcing {}s budget", limit_seconds);
        Ok(())
    }

    async fn stop_enforcing(&self) -> Result<()> {
        *lock(&self.limit_seconds) = None;
        Ok(())
    }

    async fn is_enforcing(&self) -> Result<bool> {
        Ok(lock(&self.limit_seconds).is_some())
    }

    async fn check_overlay_permission(&self) -> Result<bool> {
        Ok(self.overlay_granted.load(Ordering::SeqCst))
    }

    async fn request_overlay_permission(&self) -> Result<bool> {
        if self.grant_on_request.load(Ordering::SeqCst) {
            self.overlay_granted.store(true, Ordering::SeqCst);
        }
        Ok(self.overlay_granted.load(Ordering::SeqCst))
    }
}

/// A simulated foreground service
#[derive(Debug, Default)]
pub struct SimulatedService {
    running: AtomicBool,
    fail_start: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl SimulatedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceBridge for SimulatedService {
    async fn start_service(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("simulated foreground service crash");
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_service(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_service_running(&self) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_level_enforcement_holds_value() {
        let level = SimulatedLevel::new("volume", 30);

        level.start_enforcing(70).await.unwrap();
        assert_eq!(level.get_value().await.unwrap(), 70);
        assert!(level.is_enforcing().await.unwrap());

        // User drags the slider, enforcement snaps it back
        level.set_value(20).await.unwrap();
        assert!(level.reassert());
        assert_eq!(level.current(), 70);

        level.stop_enforcing().await.unwrap();
        level.set_value(20).await.unwrap();
        assert!(!level.reassert());
        assert_eq!(level.current(), 20);
    }

    #[tokio::test]
    async fn test_screen_time_restart_resets_usage() {
        let screen_time = SimulatedScreenTime::new();

        // Usage is not counted while nothing is enforced
        screen_time.add_usage(30);
        assert_eq!(screen_time.get_daily_usage_seconds().await.unwrap(), 0);

        screen_time.start_enforcing(3600).await.unwrap();
        screen_time.add_usage(600);
        assert_eq!(screen_time.get_daily_usage_seconds().await.unwrap(), 600);

        screen_time.start_enforcing(3600).await.unwrap();
        assert_eq!(screen_time.get_daily_usage_seconds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlay_request_respects_user_choice() {
        let screen_time = SimulatedScreenTime::new();
        screen_time.set_overlay_granted(false);
        screen_time.set_grant_on_request(false);

        assert!(!screen_time.request_overlay_permission().await.unwrap());

        screen_time.set_grant_on_request(true);
        assert!(screen_time.request_overlay_permission().await.unwrap());
        assert!(screen_time.check_overlay_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_service_failure_counts_attempt() {
        let service = SimulatedService::new();
        service.set_fail_start(true);

        assert!(service.start_service().await.is_err());
        assert_eq!(service.start_calls(), 1);
        assert!(!service.is_running());
    }
}
