use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::AdsConfig;
use crate::store::{KeyValueStore, get_timestamp, keys, set_timestamp};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Where an eligibility check came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdTrigger {
    /// App came back to the foreground
    AppForeground,
    /// Parent settings screen gained focus
    SettingsFocus,
}

impl fmt::Display for AdTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdTrigger::AppForeground => f.write_str("app foreground"),
            AdTrigger::SettingsFocus => f.write_str("settings focus"),
        }
    }
}

/// Something that can actually put an ad on screen
#[async_trait]
pub trait AdDelivery: Send + Sync {
    /// Show one ad; `Ok(true)` only when it was really displayed
    async fn show(&self) -> Result<bool>;
}

/// Rate limit for a one-shot event, persisted as the last firing time
///
/// Used for interstitial ads: at most one per window (6 hours by default).
pub struct AdGate {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    interval_ms: i64,
}

impl AdGate {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, AdsConfig::default())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: AdsConfig) -> Self {
        Self {
            store,
            clock,
            interval_ms: (config.min_interval_hours as i64).saturating_mul(HOUR_MS),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(0) as u64)
    }

    /// Whether the event may fire now; storage errors answer no
    pub async fn can_fire(&self) -> bool {
        match self.time_until_eligible_checked().await {
            Ok(None) => true,
            Ok(Some(remaining)) => {
                debug!(
                    "Too soon to show ad ({} minutes remaining)",
                    remaining.as_secs().div_ceil(60)
                );
                false
            }
            Err(e) => {
                error!("Error checking if can show ad: {:#}", e);
                false
            }
        }
    }

    /// Remember that the event fired just now
    pub async fn record_fired(&self) -> Result<()> {
        let now = self.clock.now_ms();
        set_timestamp(self.store.as_ref(), keys::LAST_AD_SHOWN, now)
            .await
            .context("Failed to save last ad shown time")?;
        info!("Last ad shown time saved");
        Ok(())
    }

    /// Time left before the event may fire again, `None` if it may fire now
    pub async fn time_until_eligible(&self) -> Option<Duration> {
        self.time_until_eligible_checked().await.unwrap_or_else(|e| {
            error!("Error reading last ad shown time: {:#}", e);
            None
        })
    }

    async fn time_until_eligible_checked(&self) -> Result<Option<Duration>> {
        let Some(last) = get_timestamp(self.store.as_ref(), keys::LAST_AD_SHOWN).await? else {
            return Ok(None);
        };

        let elapsed = self.clock.now_ms().saturating_sub(last);
        if elapsed >= self.interval_ms {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis((self.interval_ms - elapsed) as u64)))
        }
    }

    /// Check the gate, show through `delivery`, and record only a confirmed display
    pub async fn fire_if_eligible(&self, trigger: AdTrigger, delivery: &dyn AdDelivery) -> bool {
        debug!("Checking ad eligibility on {}", trigger);

        if !self.can_fire().await {
            return false;
        }

        match delivery.show().await {
            Ok(true) => {
                if let Err(e) = self.record_fired().await {
                    error!("{:#}", e);
                }
                true
            }
            Ok(false) => {
                debug!("Ad was not displayed on {}", trigger);
                false
            }
            Err(e) => {
                error!("Error showing ad on {}: {:#}", trigger, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SIX_HOURS_SECS: i64 = 6 * 60 * 60;

    fn make_gate() -> (AdGate, MemoryStore, ManualClock) {
        let memory = MemoryStore::new();
        let clock = ManualClock::new(1_700_000_000_000);
        let gate = AdGate::new(Arc::new(memory.clone()), Arc::new(clock.clone()));
        (gate, memory, clock)
    }

    struct FakeDelivery {
        displayed: bool,
        shows: AtomicUsize,
    }

    impl FakeDelivery {
        fn new(displayed: bool) -> Self {
            Self {
                displayed,
                shows: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AdDelivery for FakeDelivery {
        async fn show(&self) -> Result<bool> {
            self.shows.fetch_add(1, Ordering::SeqCst);
            Ok(self.displayed)
        }
    }

    #[tokio::test]
    async fn test_window_boundaries() {
        let (gate, _, clock) = make_gate();

        assert!(gate.can_fire().await);
        gate.record_fired().await.unwrap();
        assert!(!gate.can_fire().await);

        clock.advance_secs(SIX_HOURS_SECS - 1);
        assert!(!gate.can_fire().await);
        assert_eq!(gate.time_until_eligible().await, Some(Duration::from_secs(1)));

        clock.advance_secs(1);
        assert!(gate.can_fire().await);
        assert_eq!(gate.time_until_eligible().await, None);

        clock.advance_secs(SIX_HOURS_SECS);
        assert!(gate.can_fire().await);
    }

    #[tokio::test]
    async fn test_can_fire_has_no_side_effects() {
        let (gate, memory, _) = make_gate();

        assert!(gate.can_fire().await);
        assert!(gate.can_fire().await);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_denies() {
        let (gate, memory, _) = make_gate();
        memory.set_fail_reads(true);
        assert!(!gate.can_fire().await);
    }

    #[tokio::test]
    async fn test_fire_if_eligible_records_only_confirmed_display() {
        let (gate, _, _) = make_gate();

        let declined = FakeDelivery::new(false);
        assert!(!gate.fire_if_eligible(AdTrigger::AppForeground, &declined).await);
        assert!(gate.can_fire().await);

        let shown = FakeDelivery::new(true);
        assert!(gate.fire_if_eligible(AdTrigger::SettingsFocus, &shown).await);
        assert!(!gate.can_fire().await);

        // Gate closed: delivery is not even asked
        assert!(!gate.fire_if_eligible(AdTrigger::AppForeground, &shown).await);
        assert_eq!(shown.shows.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_interval() {
        let memory = MemoryStore::new();
        let clock = ManualClock::new(0);
        let gate = AdGate::with_config(
            Arc::new(memory),
            Arc::new(clock.clone()),
            AdsConfig { min_interval_hours: 1 },
        );

        gate.record_fired().await.unwrap();
        clock.advance_secs(3600);
        assert!(gate.can_fire().await);
        assert_eq!(gate.interval(), Duration::from_secs(3600));
    }
}
