use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::ScreenTimeConfig;
use crate::store::{KeyValueStore, keys};

/// Default for volume and brightness, in percent
pub const DEFAULT_LEVEL_PERCENT: u32 = 50;

/// A device setting the parent can lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Volume,
    Brightness,
    ScreenTime,
}

impl SettingKind {
    pub const ALL: [SettingKind; 3] = [
        SettingKind::Volume,
        SettingKind::Brightness,
        SettingKind::ScreenTime,
    ];

    /// Storage key of the persisted settings blob
    pub fn storage_key(self) -> &'static str {
        match self {
            SettingKind::Volume => keys::VOLUME_SETTINGS,
            SettingKind::Brightness => keys::BRIGHTNESS_SETTINGS,
            SettingKind::ScreenTime => keys::SCREEN_TIME_SETTINGS,
        }
    }

    /// Name of the numeric field inside the blob
    pub fn value_field(self) -> &'static str {
        match self {
            SettingKind::Volume => "volume",
            SettingKind::Brightness => "brightness",
            SettingKind::ScreenTime => "limitMinutes",
        }
    }

    /// Volume and brightness are percentages held at a fixed value
    pub fn is_level(self) -> bool {
        matches!(self, SettingKind::Volume | SettingKind::Brightness)
    }

    pub fn index(self) -> usize {
        match self {
            SettingKind::Volume => 0,
            SettingKind::Brightness => 1,
            SettingKind::ScreenTime => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SettingKind::Volume => "volume",
            SettingKind::Brightness => "brightness",
            SettingKind::ScreenTime => "screen-time",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "volume" => Ok(SettingKind::Volume),
            "brightness" => Ok(SettingKind::Brightness),
            "screen-time" | "screen_time" | "screentime" => Ok(SettingKind::ScreenTime),
            other => anyhow::bail!("Unknown setting: {}", other),
        }
    }
}

/// Valid ranges for every setting kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingLimits {
    pub screen_time_min: u32,
    pub screen_time_max: u32,
    pub screen_time_default: u32,
}

impl SettingLimits {
    pub fn range(&self, kind: SettingKind) -> (u32, u32) {
        if kind.is_level() {
            (0, 100)
        } else {
            (self.screen_time_min, self.screen_time_max)
        }
    }

    pub fn default_value(&self, kind: SettingKind) -> u32 {
        if kind.is_level() {
            DEFAULT_LEVEL_PERCENT
        } else {
            self.screen_time_default
        }
    }

    pub fn clamp(&self, kind: SettingKind, raw: i64) -> u32 {
        let (min, max) = self.range(kind);
        raw.clamp(min as i64, max as i64) as u32
    }
}

impl Default for SettingLimits {
    fn default() -> Self {
        ScreenTimeConfig::default().into()
    }
}

impl From<ScreenTimeConfig> for SettingLimits {
    fn from(config: ScreenTimeConfig) -> Self {
        Self {
            screen_time_min: config.min_minutes,
            screen_time_max: config.max_minutes,
            screen_time_default: config.default_minutes,
        }
    }
}

/// One persisted setting
///
/// `value` is a percentage for volume and brightness and a budget in minutes
/// for screen time. `is_default` means nothing was ever saved for this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingRecord {
    pub kind: SettingKind,
    pub value: u32,
    pub locked: bool,
    pub is_default: bool,
}

impl SettingRecord {
    pub fn default_for(kind: SettingKind, limits: &SettingLimits) -> Self {
        Self {
            kind,
            value: limits.default_value(kind),
            locked: false,
            is_default: true,
        }
    }
}

/// Snapshot of every setting, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllSettings {
    pub volume: SettingRecord,
    pub brightness: SettingRecord,
    pub screen_time: SettingRecord,
}

impl AllSettings {
    pub fn get(&self, kind: SettingKind) -> &SettingRecord {
        match kind {
            SettingKind::Volume => &self.volume,
            SettingKind::Brightness => &self.brightness,
            SettingKind::ScreenTime => &self.screen_time,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SettingRecord> {
        [&self.volume, &self.brightness, &self.screen_time].into_iter()
    }
}

/// Reads and writes setting records as flat JSON blobs
///
/// Values are clamped on the way in and on the way out, so a hand-edited or
/// stale blob can never produce an out-of-range value.
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    limits: SettingLimits,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>, limits: SettingLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &SettingLimits {
        &self.limits
    }

    pub fn clamp(&self, kind: SettingKind, raw: i64) -> u32 {
        self.limits.clamp(kind, raw)
    }

    /// Load a record, surfacing storage errors
    ///
    /// A blob that is not valid JSON is treated as never saved.
    pub async fn try_load(&self, kind: SettingKind) -> Result<SettingRecord> {
        let raw = self
            .store
            .get_string(kind.storage_key())
            .await
            .with_context(|| format!("Failed to read {} settings", kind))?;

        let Some(raw) = raw else {
            return Ok(SettingRecord::default_for(kind, &self.limits));
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) => Ok(self.decode(kind, &parsed)),
            Err(e) => {
                warn!("Ignoring unreadable {} settings: {}", kind, e);
                Ok(SettingRecord::default_for(kind, &self.limits))
            }
        }
    }

    /// Load a record, degrading to the default on any failure
    pub async fn load(&self, kind: SettingKind) -> SettingRecord {
        self.try_load(kind).await.unwrap_or_else(|e| {
            error!("Error getting {} settings: {:#}", kind, e);
            SettingRecord::default_for(kind, &self.limits)
        })
    }

    pub async fn load_all(&self) -> AllSettings {
        AllSettings {
            volume: self.load(SettingKind::Volume).await,
            brightness: self.load(SettingKind::Brightness).await,
            screen_time: self.load(SettingKind::ScreenTime).await,
        }
    }

    /// Clamp and persist a record, returning what was written
    pub async fn save(&self, kind: SettingKind, value: i64, locked: bool) -> Result<SettingRecord> {
        let value = self.clamp(kind, value);
        let payload = json!({
            kind.value_field(): value,
            "locked": locked,
        });

        self.store
            .set_string(kind.storage_key(), &payload.to_string())
            .await
            .with_context(|| format!("Failed to save {} settings", kind))?;

        Ok(SettingRecord {
            kind,
            value,
            locked,
            is_default: false,
        })
    }

    fn decode(&self, kind: SettingKind, parsed: &Value) -> SettingRecord {
        let value = parsed
            .get(kind.value_field())
            .and_then(Value::as_f64)
            .map(|v| self.clamp(kind, v.round() as i64))
            .unwrap_or_else(|| self.limits.default_value(kind));

        let locked = parsed
            .get("locked")
            .map(is_truthy)
            .unwrap_or(false);

        SettingRecord {
            kind,
            value,
            locked,
            is_default: false,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
