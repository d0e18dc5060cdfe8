use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::store::{KeyValueStore, SecretStore, get_timestamp, keys, set_timestamp};

/// Number of digits in the parent PIN
pub const PIN_LENGTH: usize = 4;

/// Errors surfaced to whoever is asking for the PIN
#[derive(Debug, Error)]
pub enum AuthError {
    /// Too many failed attempts; retry once the window has passed
    #[error("Too many failed attempts. Locked out for {remaining_seconds} seconds.")]
    LockedOut { remaining_seconds: u64 },

    /// PIN change was attempted with the wrong current PIN
    #[error("Current PIN is incorrect")]
    IncorrectCurrentPin,

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

/// Exponential lockout schedule
///
/// Every `attempts_per_batch`-th consecutive failure locks PIN entry for
/// `2^(failures / attempts_per_batch) * base` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub attempts_per_batch: u32,
    pub base_duration_ms: i64,
}

impl LockoutPolicy {
    /// Lockout to impose after the `failed_attempts`-th consecutive failure, if any
    pub fn lockout_duration_ms(&self, failed_attempts: u32) -> Option<i64> {
        if failed_attempts == 0 || failed_attempts % self.attempts_per_batch != 0 {
            return None;
        }

        let batches = failed_attempts / self.attempts_per_batch;
        Some(2_i64.saturating_pow(batches).saturating_mul(self.base_duration_ms))
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        LockoutConfig::default().into()
    }
}

impl From<LockoutConfig> for LockoutPolicy {
    fn from(config: LockoutConfig) -> Self {
        Self {
            attempts_per_batch: config.attempts_per_batch.max(1),
            base_duration_ms: (config.base_duration_secs as i64).saturating_mul(1000),
        }
    }
}

/// Check that a PIN is exactly four ASCII digits
///
/// The store itself accepts anything; entry screens and the CLI call this.
pub fn validate_pin_format(pin: &str) -> anyhow::Result<()> {
    if pin.len() != PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("PIN must be exactly {} digits", PIN_LENGTH);
    }
    Ok(())
}

/// Parent PIN storage with brute-force protection
///
/// The PIN itself lives in the secret store and is compared verbatim. The
/// failure counter and lockout deadline live in plain storage, and an expired
/// lockout is only cleared when the next verification reads it.
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl CredentialStore {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secrets,
            store,
            clock,
            policy: LockoutPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LockoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Store the PIN, replacing any previous one
    pub async fn save(&self, pin: &str) -> Result<(), AuthError> {
        self.secrets
            .set_secret(keys::PIN, pin)
            .await
            .context("Failed to save PIN")?;
        info!("Parent PIN saved");
        Ok(())
    }

    /// Check a candidate PIN
    ///
    /// Returns `Ok(false)` for a wrong PIN, when no PIN is configured, or when
    /// storage fails. The attempt that trips a lockout returns
    /// `Err(LockedOut)` rather than `Ok(false)`.
    pub async fn verify(&self, candidate: &str) -> Result<bool, AuthError> {
        let now = self.clock.now_ms();

        match get_timestamp(self.store.as_ref(), keys::LOCKOUT_UNTIL).await {
            Ok(Some(until)) if now < until => {
                let remaining_seconds = ceil_seconds(until - now);
                debug!("PIN entry locked out for another {}s", remaining_seconds);
                return Err(AuthError::LockedOut { remaining_seconds });
            }
            Ok(Some(_)) => {
                info!("Lockout period has passed, clearing failed attempts");
                self.clear_lockout().await;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Error verifying PIN: {:#}", e);
                return Ok(false);
            }
        }

        let stored = match self.secrets.get_secret(keys::PIN).await {
            Ok(Some(pin)) => pin,
            Ok(None) => {
                debug!("No PIN configured");
                return Ok(false);
            }
            Err(e) => {
                error!("Error reading stored PIN: {:#}", e);
                return Ok(false);
            }
        };

        if stored == candidate {
            if let Err(e) = self.store.remove_key(keys::FAILED_ATTEMPTS).await {
                warn!("Failed to reset failed attempt counter: {:#}", e);
            }
            Ok(true)
        } else {
            self.record_failure(now).await
        }
    }

    async fn record_failure(&self, now: i64) -> Result<bool, AuthError> {
        let previous = match self.failed_attempts_checked().await {
            Ok(count) => count,
            Err(e) => {
                error!("Error reading failed attempts: {:#}", e);
                return Ok(false);
            }
        };
        let failed = previous.saturating_add(1);

        if let Err(e) = self
            .store
            .set_string(keys::FAILED_ATTEMPTS, &failed.to_string())
            .await
        {
            error!("Error recording failed attempt: {:#}", e);
            return Ok(false);
        }

        warn!("Incorrect PIN entered ({} consecutive failures)", failed);

        let Some(duration_ms) = self.policy.lockout_duration_ms(failed) else {
            return Ok(false);
        };

        let until = now.saturating_add(duration_ms);
        if let Err(e) = set_timestamp(self.store.as_ref(), keys::LOCKOUT_UNTIL, until).await {
            // The caller is still told to back off even if the deadline did not persist
            error!("Error persisting lockout deadline: {:#}", e);
        }

        let remaining_seconds = ceil_seconds(duration_ms);
        warn!("Too many failed attempts, locking PIN entry for {}s", remaining_seconds);
        Err(AuthError::LockedOut { remaining_seconds })
    }

    async fn clear_lockout(&self) {
        if let Err(e) = self.store.remove_key(keys::LOCKOUT_UNTIL).await {
            warn!("Failed to clear lockout deadline: {:#}", e);
        }
        if let Err(e) = self.store.remove_key(keys::FAILED_ATTEMPTS).await {
            warn!("Failed to clear failed attempts: {:#}", e);
        }
    }

    /// Replace the PIN after re-verifying the current one
    ///
    /// A wrong `old_pin` counts toward lockout like any other attempt.
    pub async fn change_pin(&self, old_pin: &str, new_pin: &str) -> Result<(), AuthError> {
        if !self.verify(old_pin).await? {
            warn!("PIN change rejected: current PIN is incorrect");
            return Err(AuthError::IncorrectCurrentPin);
        }

        self.save(new_pin).await?;
        info!("Parent PIN changed");
        Ok(())
    }

    /// True until a PIN has been set up
    pub async fn is_first_launch(&self) -> bool {
        match self.secrets.get_secret(keys::PIN).await {
            Ok(pin) => pin.is_none(),
            Err(e) => {
                error!("Error checking first launch: {:#}", e);
                true
            }
        }
    }

    /// Seconds left in the current lockout, without clearing an expired one
    pub async fn lockout_status(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        match get_timestamp(self.store.as_ref(), keys::LOCKOUT_UNTIL).await {
            Ok(Some(until)) if now < until => Some(ceil_seconds(until - now)),
            Ok(_) => None,
            Err(e) => {
                warn!("Error reading lockout deadline: {:#}", e);
                None
            }
        }
    }

    /// Consecutive failures recorded since the last success or expired lockout
    pub async fn failed_attempts(&self) -> u32 {
        self.failed_attempts_checked().await.unwrap_or_else(|e| {
            warn!("Error reading failed attempts: {:#}", e);
            0
        })
    }

    async fn failed_attempts_checked(&self) -> anyhow::Result<u32> {
        let raw = self.store.get_string(keys::FAILED_ATTEMPTS).await?;
        Ok(raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0))
    }
}

fn ceil_seconds(ms: i64) -> u64 {
    (ms.max(0) as u64).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const START_MS: i64 = 1_700_000_000_000;

    fn make_store() -> (CredentialStore, MemoryStore, ManualClock) {
        let memory = MemoryStore::new();
        let clock = ManualClock::new(START_MS);
        let credentials = CredentialStore::new(
            Arc::new(memory.clone()),
            Arc::new(memory.clone()),
            Arc::new(clock.clone()),
        );
        (credentials, memory, clock)
    }

    async fn fail_times(credentials: &CredentialStore, times: usize) {
        for _ in 0..times {
            assert!(!credentials.verify("0000").await.unwrap());
        }
    }

    fn locked_out_seconds(result: Result<bool, AuthError>) -> u64 {
        match result {
            Err(AuthError::LockedOut { remaining_seconds }) => remaining_seconds,
            other => panic!("expected LockedOut, got {:?}", other),
        }
    }

    #[test]
    fn test_lockout_schedule() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.lockout_duration_ms(0), None);
        assert_eq!(policy.lockout_duration_ms(4), None);
        assert_eq!(policy.lockout_duration_ms(5), Some(120_000));
        assert_eq!(policy.lockout_duration_ms(6), None);
        assert_eq!(policy.lockout_duration_ms(10), Some(240_000));
        assert_eq!(policy.lockout_duration_ms(15), Some(480_000));
    }

    #[test]
    fn test_lockout_schedule_saturates() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.lockout_duration_ms(5 * 200), Some(i64::MAX));
    }

    #[test]
    fn test_validate_pin_format() {
        assert!(validate_pin_format("0123").is_ok());
        assert!(validate_pin_format("123").is_err());
        assert!(validate_pin_format("12345").is_err());
        assert!(validate_pin_format("12a4").is_err());
        assert!(validate_pin_format("١٢٣٤").is_err());
    }

    #[tokio::test]
    async fn test_verify_exact_match_only() {
        let (credentials, _, _) = make_store();
        credentials.save("1234").await.unwrap();

        assert!(credentials.verify("1234").await.unwrap());
        assert!(!credentials.verify("1235").await.unwrap());
        assert!(!credentials.verify("01234").await.unwrap());
        assert!(!credentials.verify(" 1234").await.unwrap());
        assert!(!credentials.verify("").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_without_pin_is_false_and_not_counted() {
        let (credentials, memory, _) = make_store();

        assert!(!credentials.verify("1234").await.unwrap());
        assert_eq!(memory.get_string(keys::FAILED_ATTEMPTS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_launch_scenario() {
        let (credentials, _, _) = make_store();

        assert!(credentials.is_first_launch().await);
        credentials.save("1234").await.unwrap();
        assert!(!credentials.is_first_launch().await);

        assert!(credentials.verify("1234").await.unwrap());
        fail_times(&credentials, 4).await;
        assert_eq!(credentials.failed_attempts().await, 4);

        let seconds = locked_out_seconds(credentials.verify("0000").await);
        assert_eq!(seconds, 120);
        assert_eq!(credentials.failed_attempts().await, 5);
    }

    #[tokio::test]
    async fn test_lockout_blocks_even_correct_pin() {
        let (credentials, _, clock) = make_store();
        credentials.save("1234").await.unwrap();
        fail_times(&credentials, 4).await;
        locked_out_seconds(credentials.verify("0000").await);

        clock.advance_secs(30);
        assert_eq!(locked_out_seconds(credentials.verify("1234").await), 90);
        assert_eq!(credentials.lockout_status().await, Some(90));

        // Partial seconds round up
        clock.advance_ms(89_500);
        assert_eq!(locked_out_seconds(credentials.verify("1234").await), 1);
    }

    #[tokio::test]
    async fn test_expired_lockout_restarts_count() {
        let (credentials, _, clock) = make_store();
        credentials.save("1234").await.unwrap();

        fail_times(&credentials, 4).await;
        assert_eq!(locked_out_seconds(credentials.verify("0000").await), 120);

        // The counter survives a lockout that is still running
        clock.advance_secs(120);
        assert_eq!(credentials.lockout_status().await, None);

        // Expired lockout is cleared on read, so counting starts over
        fail_times(&credentials, 4).await;
        assert_eq!(credentials.failed_attempts().await, 4);
        assert_eq!(locked_out_seconds(credentials.verify("0000").await), 120);
    }

    #[tokio::test]
    async fn test_ten_consecutive_failures_without_expiry_read() {
        let (credentials, memory, _) = make_store();
        credentials.save("1234").await.unwrap();

        // Nine failures already on record with no lockout pending
        memory.set_string(keys::FAILED_ATTEMPTS, "9").await.unwrap();
        assert_eq!(locked_out_seconds(credentials.verify("0000").await), 240);
        assert_eq!(credentials.failed_attempts().await, 10);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (credentials, memory, _) = make_store();
        credentials.save("1234").await.unwrap();

        fail_times(&credentials, 3).await;
        assert!(credentials.verify("1234").await.unwrap());
        assert_eq!(memory.get_string(keys::FAILED_ATTEMPTS).await.unwrap(), None);

        fail_times(&credentials, 4).await;
        assert_eq!(locked_out_seconds(credentials.verify("0000").await), 120);
    }

    #[tokio::test]
    async fn test_elapsed_lockout_proceeds_and_clears() {
        let (credentials, memory, _) = make_store();
        credentials.save("1234").await.unwrap();

        memory.set_string(keys::FAILED_ATTEMPTS, "5").await.unwrap();
        memory
            .set_string(keys::LOCKOUT_UNTIL, &(START_MS - 1).to_string())
            .await
            .unwrap();

        assert!(credentials.verify("1234").await.unwrap());
        assert_eq!(memory.get_string(keys::LOCKOUT_UNTIL).await.unwrap(), None);
        assert_eq!(memory.get_string(keys::FAILED_ATTEMPTS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_elapsed_lockout_then_wrong_pin_starts_new_count() {
        let (credentials, memory, _) = make_store();
        credentials.save("1234").await.unwrap();

        memory.set_string(keys::FAILED_ATTEMPTS, "5").await.unwrap();
        memory
            .set_string(keys::LOCKOUT_UNTIL, &START_MS.to_string())
            .await
            .unwrap();

        assert!(!credentials.verify("9999").await.unwrap());
        assert_eq!(credentials.failed_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_change_pin() {
        let (credentials, _, _) = make_store();
        credentials.save("1234").await.unwrap();

        credentials.change_pin("1234", "5678").await.unwrap();
        assert!(credentials.verify("5678").await.unwrap());
        assert!(!credentials.verify("1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_change_pin_wrong_current_counts_toward_lockout() {
        let (credentials, _, _) = make_store();
        credentials.save("1234").await.unwrap();

        for _ in 0..4 {
            let result = credentials.change_pin("0000", "5678").await;
            assert!(matches!(result, Err(AuthError::IncorrectCurrentPin)));
        }

        let result = credentials.change_pin("0000", "5678").await;
        assert!(matches!(result, Err(AuthError::LockedOut { remaining_seconds: 120 })));

        // PIN unchanged
        assert!(matches!(
            credentials.verify("1234").await,
            Err(AuthError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_false() {
        let (credentials, memory, _) = make_store();
        credentials.save("1234").await.unwrap();

        memory.set_fail_reads(true);
        assert!(!credentials.verify("1234").await.unwrap());
        assert!(credentials.is_first_launch().await);

        memory.set_fail_reads(false);
        memory.set_fail_writes(true);
        assert!(!credentials.verify("0000").await.unwrap());
        assert!(matches!(
            credentials.save("4321").await,
            Err(AuthError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let (credentials, _, _) = make_store();
        let credentials = credentials.with_policy(LockoutPolicy {
            attempts_per_batch: 3,
            base_duration_ms: 10_000,
        });
        credentials.save("1234").await.unwrap();

        fail_times(&credentials, 2).await;
        assert_eq!(locked_out_seconds(credentials.verify("0000").await), 20);
    }

    #[test]
    fn test_locked_out_message() {
        let err = AuthError::LockedOut { remaining_seconds: 120 };
        assert_eq!(
            err.to_string(),
            "Too many failed attempts. Locked out for 120 seconds."
        );
    }
}
