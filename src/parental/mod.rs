/// Parental controls for a kids' device
///
/// This module provides functionality to:
/// - Protect the settings screen with a PIN and escalating lockouts
/// - Lock volume, brightness and screen time at parent-chosen values
/// - Keep the shared background service running while anything is locked
/// - Rate-limit interstitial ads

pub mod ads;
pub mod auth;
pub mod enforcement;
pub mod screen_time;
pub mod service;
pub mod settings;

pub use ads::{AdDelivery, AdGate, AdTrigger};
pub use auth::{AuthError, CredentialStore, LockoutPolicy, PIN_LENGTH, validate_pin_format};
pub use enforcement::{EnforcementCoordinator, UpdateOutcome};
pub use screen_time::{ScreenTimeUsage, format_minutes, format_seconds};
pub use service::{ServiceStatus, ServiceSupervisor};
pub use settings::{AllSettings, SettingKind, SettingLimits, SettingRecord, SettingsStore};
