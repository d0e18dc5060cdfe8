use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{KeyValueStore, SecretStore};
use crate::platform::common::atomic_write_with_mode;

/// A flat string map persisted as a JSON object
///
/// Every mutation rewrites the whole file atomically. The mutex serializes
/// read-modify-write cycles within this process.
#[derive(Debug)]
struct JsonMapFile {
    path: PathBuf,
    mode: Option<u32>,
    guard: Mutex<()>,
}

impl JsonMapFile {
    fn new(path: PathBuf, mode: Option<u32>) -> Self {
        Self {
            path,
            mode,
            guard: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(BTreeMap::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read store file: {}", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", self.path.display()))
    }

    async fn store(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(map).context("Failed to serialize store")?;
        let path = self.path.clone();
        let mode = self.mode;

        tokio::task::spawn_blocking(move || -> Result<()> {
            atomic_write_with_mode(&path, content.as_bytes(), mode)
                .with_context(|| format!("Failed to write store file: {}", path.display()))
        })
        .await
        .context("Store writer task panicked")?
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value.to_string());
        self.store(&map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.store(&map).await?;
        }
        Ok(())
    }
}

/// Key-value store backed by a JSON file (`settings.json` in the data dir)
#[derive(Debug)]
pub struct FileKeyValueStore {
    file: JsonMapFile,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonMapFile::new(path.into(), None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.file.get(key).await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.file.set(key, value).await
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        self.file.remove(key).await
    }
}

/// Secret store backed by an owner-only JSON file
///
/// Desktop stand-in for an OS keychain: the file is always written with mode
/// 0600. Secrets are kept in cleartext inside it.
#[derive(Debug)]
pub struct FileSecretStore {
    file: JsonMapFile,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonMapFile::new(path.into(), Some(0o600)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.file.set(key, value).await
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        self.file.get(key).await
    }
}
