//! Platform collaborators
//!
//! The parental-control core never touches device hardware itself. It talks
//! to these bridges, which a host application implements on top of its native
//! APIs (audio manager, system settings, overlay windows, foreground
//! services). `simulated` provides an in-memory implementation of all of them.

pub mod common;
pub mod simulated;

pub use simulated::{SimulatedDevice, SimulatedLevel, SimulatedScreenTime, SimulatedService};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A device level expressed in percent (system volume, screen brightness)
#[async_trait]
pub trait LevelBridge: Send + Sync {
    /// Set the level once, without holding it
    async fn set_value(&self, percent: u32) -> Result<()>;

    /// Read the live device level
    async fn get_value(&self) -> Result<u32>;

    /// Continuously hold the level at `percent` until told to stop
    async fn start_enforcing(&self, percent: u32) -> Result<()>;

    async fn stop_enforcing(&self) -> Result<()>;

    async fn is_enforcing(&self) -> Result<bool>;
}

/// Screen-time budget enforcement
#[async_trait]
pub trait ScreenTimeBridge: Send + Sync {
    /// Seconds of usage counted since enforcement last started
    async fn get_daily_usage_seconds(&self) -> Result<u64>;

    /// Start counting usage against `limit_seconds`, restarting the counter
    async fn start_enforcing(&self, limit_seconds: u64) -> Result<()>;

    async fn stop_enforcing(&self) -> Result<()>;

    async fn is_enforcing(&self) -> Result<bool>;

    /// Whether the app may draw the lock overlay over other apps
    async fn check_overlay_permission(&self) -> Result<bool>;

    /// Ask the user to grant the overlay capability; returns the resulting grant
    async fn request_overlay_permission(&self) -> Result<bool>;
}

/// The single background service that keeps enforcement alive
#[async_trait]
pub trait ServiceBridge: Send + Sync {
    async fn start_service(&self) -> Result<()>;
    async fn stop_service(&self) -> Result<()>;
    async fn is_service_running(&self) -> Result<bool>;
}

/// Handles to every platform collaborator the enforcement coordinator uses
#[derive(Clone)]
pub struct PlatformBridges {
    pub volume: Arc<dyn LevelBridge>,
    pub brightness: Arc<dyn LevelBridge>,
    pub screen_time: Arc<dyn ScreenTimeBridge>,
    pub service: Arc<dyn ServiceBridge>,
}
