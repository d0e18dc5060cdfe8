use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::parental::screen_time::{ScreenTimeUsage, limit_seconds};
use crate::parental::service::{ServiceStatus, ServiceSupervisor};
use crate::parental::settings::{AllSettings, SettingKind, SettingRecord, SettingsStore};
use crate::platform::{LevelBridge, PlatformBridges};

/// Result of a settings update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Persisted and handed to the platform
    Applied(SettingRecord),
    /// Something failed after validation; whatever was persisted stays
    Failed,
    /// Screen time cannot be locked without the overlay capability; nothing was persisted
    NeedsOverlayPermission,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single owner of setting persistence and platform enforcement
///
/// Every change to a lockable setting goes through here so the persisted
/// record, the in-memory enforced target, the platform bridge and the
/// background service stay in step. Build one per process and share it.
pub struct EnforcementCoordinator {
    settings: SettingsStore,
    bridges: PlatformBridges,
    service: ServiceSupervisor,
    enforced: Mutex<HashMap<SettingKind, u32>>,
    update_locks: [AsyncMutex<()>; 3],
    initialized: AsyncMutex<bool>,
}

impl EnforcementCoordinator {
    pub fn new(settings: SettingsStore, bridges: PlatformBridges) -> Self {
        let service = ServiceSupervisor::new(Arc::clone(&bridges.service));
        Self {
            settings,
            bridges,
            service,
            enforced: Mutex::new(HashMap::new()),
            update_locks: [AsyncMutex::new(()), AsyncMutex::new(()), AsyncMutex::new(())],
            initialized: AsyncMutex::new(false),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Resume enforcement for every setting that was locked in a previous run
    ///
    /// Runs once. Later calls return `true` without touching storage or the
    /// platform. If the stored settings cannot be read the call returns
    /// `false` and the next call tries again.
    pub async fn initialize(&self) -> bool {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            debug!("Enforcement already initialized");
            return true;
        }

        self.service.sync_with_platform().await;

        let mut records = Vec::with_capacity(SettingKind::ALL.len());
        for kind in SettingKind::ALL {
            match self.settings.try_load(kind).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!("Error initializing enforcement: {:#}", e);
                    return false;
                }
            }
        }

        for record in records {
            if record.locked && !record.is_default {
                self.resume(record).await;
            }
        }

        *initialized = true;
        info!("Enforcement initialized");
        true
    }

    async fn resume(&self, record: SettingRecord) {
        let kind = record.kind;
        let _guard = self.update_locks[kind.index()].lock().await;

        if kind == SettingKind::ScreenTime && !self.overlay_granted().await {
            warn!("Screen time is locked but overlay permission is missing; not enforcing");
            return;
        }

        self.set_enforced(kind, Some(record.value));
        match self.start_platform(kind, record.value).await {
            Ok(()) => {
                info!("Resumed {} enforcement at {}", kind, record.value);
                self.service.notify_need(kind, true).await;
            }
            Err(e) => error!("Error resuming {} enforcement: {:#}", kind, e),
        }
    }

    /// Change a setting and apply it to the device; `true` when everything succeeded
    pub async fn update_setting(&self, kind: SettingKind, value: i64, locked: bool) -> bool {
        self.apply_setting(kind, value, locked).await.is_applied()
    }

    /// Change a setting and report what happened
    ///
    /// Updates for the same kind run one at a time. Storage is not rolled
    /// back if the platform refuses the change.
    pub async fn apply_setting(&self, kind: SettingKind, value: i64, locked: bool) -> UpdateOutcome {
        let _guard = self.update_locks[kind.index()].lock().await;
        let mut value = self.settings.clamp(kind, value);

        if kind == SettingKind::ScreenTime && locked {
            match self.bridges.screen_time.check_overlay_permission().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Overlay permission required to lock screen time");
                    return UpdateOutcome::NeedsOverlayPermission;
                }
                Err(e) => {
                    error!("Error checking overlay permission: {:#}", e);
                    return UpdateOutcome::Failed;
                }
            }
        }

        // Unlocking keeps whatever level the device is at right now
        if let Some(bridge) = self.level_bridge(kind) {
            if !locked && self.was_locked(kind).await {
                match bridge.get_value().await {
                    Ok(live) => value = self.settings.clamp(kind, i64::from(live)),
                    Err(e) => warn!("Error reading current {}, keeping {}: {:#}", kind, value, e),
                }
            }
        }

        let record = match self.settings.save(kind, i64::from(value), locked).await {
            Ok(record) => record,
            Err(e) => {
                error!("Error updating {} settings: {:#}", kind, e);
                return UpdateOutcome::Failed;
            }
        };

        self.set_enforced(kind, locked.then_some(value));

        let applied = if locked {
            self.start_platform(kind, value).await
        } else {
            self.stop_platform(kind).await
        };

        if let Err(e) = applied {
            error!("Error updating {} settings: {:#}", kind, e);
            return UpdateOutcome::Failed;
        }

        self.service.notify_need(kind, locked).await;
        info!("{} settings updated: {}, locked: {}", kind, value, locked);
        UpdateOutcome::Applied(record)
    }

    async fn was_locked(&self, kind: SettingKind) -> bool {
        if self.get_enforced_value(kind).is_some() {
            return true;
        }
        match self.settings.try_load(kind).await {
            Ok(record) => record.locked,
            Err(e) => {
                warn!("Error reading {} settings: {:#}", kind, e);
                false
            }
        }
    }

    /// Record whether `component` needs the background service
    pub async fn notify_service_need(&self, component: SettingKind, is_enforcing: bool) {
        self.service.notify_need(component, is_enforcing).await;
    }

    /// Manual retry after the service failed to start
    pub async fn force_start_service(&self) -> bool {
        self.service.force_start().await
    }

    pub async fn force_stop_service(&self) -> bool {
        self.service.force_stop().await
    }

    pub async fn is_service_running(&self) -> bool {
        self.service.is_running().await
    }

    pub async fn service_start_failed(&self) -> bool {
        self.service.start_failed().await
    }

    pub async fn service_status(&self) -> ServiceStatus {
        self.service.status().await
    }

    /// Target the coordinator is holding for `kind`, if locked
    pub fn get_enforced_value(&self, kind: SettingKind) -> Option<u32> {
        lock(&self.enforced).get(&kind).copied()
    }

    fn set_enforced(&self, kind: SettingKind, value: Option<u32>) {
        let mut enforced = lock(&self.enforced);
        match value {
            Some(value) => enforced.insert(kind, value),
            None => enforced.remove(&kind),
        };
    }

    pub async fn get_setting(&self, kind: SettingKind) -> SettingRecord {
        self.settings.load(kind).await
    }

    pub async fn get_all_settings(&self) -> AllSettings {
        self.settings.load_all().await
    }

    /// Value to pre-fill an editor with
    ///
    /// The stored value while locked (and always for screen time), the live
    /// device level otherwise.
    pub async fn staged_value(&self, kind: SettingKind) -> u32 {
        let record = self.settings.load(kind).await;
        if record.is_default || record.locked {
            return record.value;
        }

        let Some(bridge) = self.level_bridge(kind) else {
            return record.value;
        };

        match bridge.get_value().await {
            Ok(live) => self.settings.clamp(kind, i64::from(live)),
            Err(e) => {
                warn!("Error reading current {}: {:#}", kind, e);
                record.value
            }
        }
    }

    /// Set a volume or brightness level once, without locking it
    pub async fn set_device_value(&self, kind: SettingKind, value: i64) -> bool {
        let Some(bridge) = self.level_bridge(kind) else {
            warn!("{} has no device level to set", kind);
            return false;
        };

        let value = self.settings.clamp(kind, value);
        match bridge.set_value(value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error setting {}: {:#}", kind, e);
                false
            }
        }
    }

    pub async fn screen_time_status(&self) -> ScreenTimeUsage {
        let record = self.settings.load(SettingKind::ScreenTime).await;

        let used = if record.locked {
            self.bridges
                .screen_time
                .get_daily_usage_seconds()
                .await
                .unwrap_or_else(|e| {
                    error!("Error getting daily usage: {:#}", e);
                    0
                })
        } else {
            0
        };

        ScreenTimeUsage::compute(record.value, record.locked, used)
    }

    /// Ask the platform whether `kind` is being enforced right now
    pub async fn is_enforcing(&self, kind: SettingKind) -> bool {
        let result = match self.level_bridge(kind) {
            Some(bridge) => bridge.is_enforcing().await,
            None => self.bridges.screen_time.is_enforcing().await,
        };

        result.unwrap_or_else(|e| {
            error!("Error checking {} enforcement: {:#}", kind, e);
            false
        })
    }

    pub async fn request_overlay_permission(&self) -> bool {
        self.bridges
            .screen_time
            .request_overlay_permission()
            .await
            .unwrap_or_else(|e| {
                error!("Error requesting overlay permission: {:#}", e);
                false
            })
    }

    async fn overlay_granted(&self) -> bool {
        self.bridges
            .screen_time
            .check_overlay_permission()
            .await
            .unwrap_or_else(|e| {
                error!("Error checking overlay permission: {:#}", e);
                false
            })
    }

    fn level_bridge(&self, kind: SettingKind) -> Option<&Arc<dyn LevelBridge>> {
        match kind {
            SettingKind::Volume => Some(&self.bridges.volume),
            SettingKind::Brightness => Some(&self.bridges.brightness),
            SettingKind::ScreenTime => None,
        }
    }

    async fn start_platform(&self, kind: SettingKind, value: u32) -> Result<()> {
        match self.level_bridge(kind) {
            Some(bridge) => bridge.start_enforcing(value).await,
            None => {
                self.bridges
                    .screen_time
                    .start_enforcing(limit_seconds(value))
                    .await
            }
        }
    }

    async fn stop_platform(&self, kind: SettingKind) -> Result<()> {
        match self.level_bridge(kind) {
            Some(bridge) => bridge.stop_enforcing().await,
            None => self.bridges.screen_time.stop_enforcing().await,
        }
    }
}
