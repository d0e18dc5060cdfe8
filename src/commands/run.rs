use anyhow::Result;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use kids_guard::parental::{SettingKind, format_seconds};

use super::GuardContext;

/// Resume enforcement and hold the simulated device until Ctrl+C
pub async fn run_guard(ctx: &GuardContext, tick_secs: u64) -> Result<()> {
    let tick_secs = tick_secs.max(1);

    if !ctx.coordinator.initialize().await {
        anyhow::bail!("Failed to initialize enforcement, see log for details");
    }

    info!("Kids Guard running (check every {} seconds)", tick_secs);
    info!("Data directory: {}", ctx.data_dir.display());
    println!("Press Ctrl+C to stop");

    let mut interval = time::interval(Duration::from_secs(tick_secs));
    let mut limit_reported = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                limit_reported = tick(ctx, tick_secs, limit_reported).await;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Error waiting for Ctrl+C: {:#}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// One enforcement pass; returns whether the screen-time limit has been reported
async fn tick(ctx: &GuardContext, tick_secs: u64, limit_reported: bool) -> bool {
    for (kind, level) in [
        (SettingKind::Volume, &ctx.device.volume),
        (SettingKind::Brightness, &ctx.device.brightness),
    ] {
        if level.reassert() {
            info!("Restored locked {} to {:?}", kind, ctx.coordinator.get_enforced_value(kind));
        }
    }

    ctx.device.screen_time.add_usage(tick_secs);
    let usage = ctx.coordinator.screen_time_status().await;
    if !usage.locked {
        return false;
    }

    debug!("Screen time remaining: {}", format_seconds(usage.remaining_seconds));
    if usage.expired && !limit_reported {
        warn!("Screen time limit of {} minutes reached", usage.limit_minutes);
    }
    usage.expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use kids_guard::config::GuardConfig;
    use kids_guard::platform::LevelBridge;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tick_restores_and_counts() {
        let dir = TempDir::new().unwrap();
        let config = GuardConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..GuardConfig::default()
        };
        let ctx = GuardContext::from_config(config).unwrap();

        assert!(ctx.coordinator.update_setting(SettingKind::Volume, 40, true).await);
        assert!(ctx.coordinator.update_setting(SettingKind::ScreenTime, 15, true).await);

        ctx.device.volume.set_value(90).await.unwrap();
        assert!(!tick(&ctx, 600, false).await);
        assert_eq!(ctx.device.volume.current(), 40);

        assert!(tick(&ctx, 300, false).await);
    }
}
