use anyhow::Result;

use kids_guard::parental::{SettingKind, UpdateOutcome, format_seconds};

use super::GuardContext;
use super::utils::format_value;
use crate::cli::SettingsCommands;

pub async fn run_settings_command(command: SettingsCommands, ctx: &GuardContext) -> Result<()> {
    match command {
        SettingsCommands::Show => show(ctx).await,
        SettingsCommands::Set { setting, value, lock, pin } => {
            let kind: SettingKind = setting.parse()?;
            set(ctx, kind, value, lock, &pin).await
        }
    }
}

async fn show(ctx: &GuardContext) -> Result<()> {
    ctx.coordinator.initialize().await;

    println!("Device Settings");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let all = ctx.coordinator.get_all_settings().await;
    for record in all.iter() {
        let state = if record.is_default {
            "not configured"
        } else if record.locked {
            "LOCKED"
        } else {
            "unlocked"
        };
        println!(
            "{:<12} {:>8}  {}",
            record.kind.name(),
            format_value(record.kind, record.value),
            state
        );

        if !record.locked {
            let staged = ctx.coordinator.staged_value(record.kind).await;
            if staged != record.value {
                println!("{:<12} {:>8}  (current device value)", "", format_value(record.kind, staged));
            }
        }
    }

    let usage = ctx.coordinator.screen_time_status().await;
    if usage.locked {
        println!();
        println!("Screen time used:      {}", format_seconds(usage.daily_usage_seconds));
        if usage.expired {
            println!("Screen time remaining: none (limit reached)");
        } else {
            println!("Screen time remaining: {}", format_seconds(usage.remaining_seconds));
        }
    }

    Ok(())
}

async fn set(ctx: &GuardContext, kind: SettingKind, value: i64, lock: bool, pin: &str) -> Result<()> {
    ctx.require_pin(pin).await?;
    ctx.coordinator.initialize().await;

    // An unlocked level is applied to the device once, then saved
    if kind.is_level() && !lock {
        ctx.coordinator.set_device_value(kind, value).await;
    }

    let mut outcome = ctx.coordinator.apply_setting(kind, value, lock).await;

    if outcome == UpdateOutcome::NeedsOverlayPermission {
        println!("Screen time lock needs permission to draw over other apps, requesting...");
        if !ctx.coordinator.request_overlay_permission().await {
            anyhow::bail!("Overlay permission denied; screen time was not locked");
        }
        outcome = ctx.coordinator.apply_setting(kind, value, lock).await;
    }

    match outcome {
        UpdateOutcome::Applied(record) => {
            println!(
                "✓ {} set to {}{}",
                kind,
                format_value(kind, record.value),
                if record.locked { " (locked)" } else { "" }
            );
            if ctx.coordinator.service_start_failed().await {
                println!("  Warning: enforcement service failed to start. Run 'kids-guard service retry'.");
            }
            Ok(())
        }
        UpdateOutcome::NeedsOverlayPermission => {
            anyhow::bail!("Overlay permission is still missing; screen time was not locked")
        }
        UpdateOutcome::Failed => anyhow::bail!("Failed to apply {} settings", kind),
    }
}
