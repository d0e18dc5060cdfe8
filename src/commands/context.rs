use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use kids_guard::clock::{Clock, SystemClock};
use kids_guard::config::{GuardConfig, get_config_path, load_config};
use kids_guard::parental::{
    AdGate, AuthError, CredentialStore, EnforcementCoordinator, LockoutPolicy, SettingLimits,
    SettingsStore,
};
use kids_guard::platform::SimulatedDevice;
use kids_guard::store::{FileKeyValueStore, FileSecretStore, KeyValueStore, SecretStore};

pub const SETTINGS_FILE: &str = "settings.json";
pub const SECRETS_FILE: &str = "secrets.json";

/// Everything a command needs, wired to the on-disk stores
pub struct GuardContext {
    pub data_dir: PathBuf,
    pub credentials: CredentialStore,
    pub coordinator: Arc<EnforcementCoordinator>,
    pub ads: AdGate,
    pub device: SimulatedDevice,
}

impl GuardContext {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => get_config_path()?,
        };
        let config = load_config(&config_path).context("Failed to load configuration file")?;
        Self::from_config(config)
    }

    pub fn from_config(config: GuardConfig) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;
        debug!("Using data directory: {}", data_dir.display());

        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(data_dir.join(SETTINGS_FILE)));
        let secrets: Arc<dyn SecretStore> =
            Arc::new(FileSecretStore::new(data_dir.join(SECRETS_FILE)));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let credentials = CredentialStore::new(secrets, store.clone(), clock.clone())
            .with_policy(LockoutPolicy::from(config.lockout));

        let device = SimulatedDevice::new();
        let settings = SettingsStore::new(store.clone(), SettingLimits::from(config.screen_time));
        let coordinator = Arc::new(EnforcementCoordinator::new(settings, device.bridges()));

        let ads = AdGate::with_config(store, clock, config.ads);

        Ok(Self {
            data_dir,
            credentials,
            coordinator,
            ads,
            device,
        })
    }

    /// Fail unless `pin` is the configured parent PIN
    pub async fn require_pin(&self, pin: &str) -> Result<()> {
        if self.credentials.is_first_launch().await {
            anyhow::bail!("No parent PIN configured. Run 'kids-guard pin setup' first.");
        }

        match self.credentials.verify(pin).await {
            Ok(true) => Ok(()),
            Ok(false) => anyhow::bail!("Incorrect PIN"),
            Err(e @ AuthError::LockedOut { .. }) => Err(e.into()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to verify PIN")),
        }
    }
}
