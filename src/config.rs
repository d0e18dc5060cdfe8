use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kids Guard configuration (`kids-guard.toml`)
///
/// Every field has a default, so an absent or empty file yields the stock
/// policy: 5 attempts per lockout batch, 60 second base lockout, 6 hours
/// between ads, screen time between 15 minutes and 8 hours.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GuardConfig {
    /// Override for where settings and the PIN are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub lockout: LockoutConfig,

    #[serde(default)]
    pub ads: AdsConfig,

    #[serde(default)]
    pub screen_time: ScreenTimeConfig,
}

/// Brute-force protection for PIN entry
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Every this many consecutive failures triggers a lockout
    #[serde(default = "default_attempts_per_batch")]
    pub attempts_per_batch: u32,

    /// Lockout length is `2^batches * base_duration_secs`
    #[serde(default = "default_base_duration_secs")]
    pub base_duration_secs: u64,
}

fn default_attempts_per_batch() -> u32 {
    5
}

fn default_base_duration_secs() -> u64 {
    60
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            attempts_per_batch: default_attempts_per_batch(),
            base_duration_secs: default_base_duration_secs(),
        }
    }
}

/// Ad eligibility window
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct AdsConfig {
    #[serde(default = "default_min_interval_hours")]
    pub min_interval_hours: u64,
}

fn default_min_interval_hours() -> u64 {
    6
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            min_interval_hours: default_min_interval_hours(),
        }
    }
}

/// Allowed range for the daily screen-time budget, in minutes
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScreenTimeConfig {
    #[serde(default = "default_min_minutes")]
    pub min_minutes: u32,

    #[serde(default = "default_max_minutes")]
    pub max_minutes: u32,

    #[serde(default = "default_default_minutes")]
    pub default_minutes: u32,
}

fn default_min_minutes() -> u32 {
    15
}

fn default_max_minutes() -> u32 {
    480
}

fn default_default_minutes() -> u32 {
    120
}

impl Default for ScreenTimeConfig {
    fn default() -> Self {
        Self {
            min_minutes: default_min_minutes(),
            max_minutes: default_max_minutes(),
            default_minutes: default_default_minutes(),
        }
    }
}

impl GuardConfig {
    /// Directory holding `settings.json` and `secrets.json`
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        let dirs = directories::ProjectDirs::from("", "", "kids-guard")
            .context("Could not determine data directory location")?;
        Ok(dirs.data_local_dir().to_path_buf())
    }
}

/// Get the default config file path
pub fn get_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "kids-guard")
        .context("Could not determine config directory location")?;
    Ok(dirs.config_dir().join("kids-guard.toml"))
}

/// Load configuration from a TOML file, falling back to defaults when it is absent
pub fn load_config(path: &Path) -> Result<GuardConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(GuardConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: GuardConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Save configuration to a TOML file
pub fn save_config(path: &Path, config: &GuardConfig) -> Result<()> {
    validate_config(config)?;

    let content = toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &GuardConfig) -> Result<()> {
    if config.lockout.attempts_per_batch == 0 {
        anyhow::bail!("lockout.attempts_per_batch must be at least 1");
    }

    if config.lockout.base_duration_secs == 0 {
        anyhow::bail!("lockout.base_duration_secs must be at least 1");
    }

    if config.ads.min_interval_hours == 0 {
        anyhow::bail!("ads.min_interval_hours must be at least 1");
    }

    let st = &config.screen_time;
    if st.min_minutes == 0 || st.min_minutes > st.max_minutes {
        anyhow::bail!(
            "screen_time range is invalid: min {} / max {}",
            st.min_minutes,
            st.max_minutes
        );
    }

    if !(st.min_minutes..=st.max_minutes).contains(&st.default_minutes) {
        anyhow::bail!(
            "screen_time.default_minutes {} is outside {}..={}",
            st.default_minutes,
            st.min_minutes,
            st.max_minutes
        );
    }

    Ok(())
}
