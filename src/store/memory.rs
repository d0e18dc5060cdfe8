use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{KeyValueStore, SecretStore};

/// In-memory store implementing both storage traits
///
/// Secrets and plain values live in separate maps, mirroring the split
/// between an OS keychain and preference storage. Clones share state.
/// Reads and writes can be made to fail for exercising degraded paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    values: Mutex<HashMap<String, String>>,
    secrets: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read return an I/O error
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write or removal return an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of plain keys currently stored
    pub fn len(&self) -> usize {
        lock(&self.inner.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_read(&self) -> Result<()> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage read failure");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage write failure");
        }
        Ok(())
    }
}

// A poisoned map is still structurally valid, keep using it.
fn lock(map: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.check_read()?;
        Ok(lock(&self.inner.values).get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.check_write()?;
        lock(&self.inner.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        self.check_write()?;
        lock(&self.inner.values).remove(key);
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.check_write()?;
        lock(&self.inner.secrets).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        self.check_read()?;
        Ok(lock(&self.inner.secrets).get(key).cloned())
    }
}
