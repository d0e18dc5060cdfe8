/// Persistence collaborators
///
/// Two kinds of storage back the parental controls:
/// - a secret store (OS keychain or equivalent) holding only the parent PIN
/// - a plain key-value store holding settings blobs and bookkeeping counters
///
/// Both are flat key → string maps. Values are decimal strings or small
/// JSON objects, see [`keys`] for the layout.

mod file;
mod memory;

pub use file::{FileKeyValueStore, FileSecretStore};
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// Storage keys shared by every component
pub mod keys {
    /// Secret store identifier for the parent PIN
    pub const PIN: &str = "parent_pin";

    pub const VOLUME_SETTINGS: &str = "volume_settings";
    pub const BRIGHTNESS_SETTINGS: &str = "brightness_settings";
    pub const SCREEN_TIME_SETTINGS: &str = "screen_time_settings";

    pub const FAILED_ATTEMPTS: &str = "failed_attempts";
    pub const LOCKOUT_UNTIL: &str = "lockout_until";
    pub const LAST_AD_SHOWN: &str = "last_ad_shown";
}

/// Secure, OS-backed secret storage
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;
}

/// Plain persistent key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_key(&self, key: &str) -> Result<()>;
}

/// Read an epoch-milliseconds timestamp stored as a decimal string
///
/// Unparseable values are treated as absent.
pub(crate) async fn get_timestamp(store: &dyn KeyValueStore, key: &str) -> Result<Option<i64>> {
    let raw = store.get_string(key).await?;
    Ok(raw.and_then(|s| s.trim().parse::<i64>().ok()))
}

pub(crate) async fn set_timestamp(store: &dyn KeyValueStore, key: &str, ms: i64) -> Result<()> {
    store.set_string(key, &ms.to_string()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timestamp_roundtrip_and_garbage() {
        let store = MemoryStore::new();

        assert_eq!(get_timestamp(&store, keys::LAST_AD_SHOWN).await.unwrap(), None);

        set_timestamp(&store, keys::LAST_AD_SHOWN, 1_700_000_000_123).await.unwrap();
        assert_eq!(
            store.get_string(keys::LAST_AD_SHOWN).await.unwrap().as_deref(),
            Some("1700000000123")
        );
        assert_eq!(
            get_timestamp(&store, keys::LAST_AD_SHOWN).await.unwrap(),
            Some(1_700_000_000_123)
        );

        store.set_string(keys::LAST_AD_SHOWN, "not-a-number").await.unwrap();
        assert_eq!(get_timestamp(&store, keys::LAST_AD_SHOWN).await.unwrap(), None);
    }
}
