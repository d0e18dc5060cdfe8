use anyhow::{Context, Result};

use kids_guard::parental::{PIN_LENGTH, validate_pin_format};

use super::GuardContext;
use crate::cli::PinCommands;

pub async fn run_pin_command(command: PinCommands, ctx: &GuardContext) -> Result<()> {
    match command {
        PinCommands::Setup { pin } => setup(ctx, &pin).await,
        PinCommands::Verify { pin } => verify(ctx, &pin).await,
        PinCommands::Change { old, new } => change(ctx, &old, &new).await,
        PinCommands::Status => status(ctx).await,
    }
}

/// First-launch PIN setup
async fn setup(ctx: &GuardContext, pin: &str) -> Result<()> {
    if !ctx.credentials.is_first_launch().await {
        anyhow::bail!("A parent PIN is already configured. Use 'kids-guard pin change' instead.");
    }

    validate_pin_format(pin)?;
    ctx.credentials.save(pin).await.context("Failed to save PIN")?;

    println!("✓ Parent PIN saved");
    println!("  Data directory: {}", ctx.data_dir.display());
    Ok(())
}

async fn verify(ctx: &GuardContext, pin: &str) -> Result<()> {
    ctx.require_pin(pin).await?;
    println!("✓ PIN accepted");
    Ok(())
}

async fn change(ctx: &GuardContext, old: &str, new: &str) -> Result<()> {
    validate_pin_format(new)?;
    ctx.credentials.change_pin(old, new).await?;
    println!("✓ Parent PIN changed");
    Ok(())
}

async fn status(ctx: &GuardContext) -> Result<()> {
    println!("Parent PIN Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if ctx.credentials.is_first_launch().await {
        println!("PIN:              not configured");
        println!();
        println!("Run 'kids-guard pin setup <{}-digit PIN>' to protect the settings.", PIN_LENGTH);
        return Ok(());
    }

    println!("PIN:              configured");
    println!("Failed attempts:  {}", ctx.credentials.failed_attempts().await);

    let policy = ctx.credentials.policy();
    println!(
        "Lockout policy:   every {} failures, starting at {}s",
        policy.attempts_per_batch,
        policy.base_duration_ms / 1000
    );

    match ctx.credentials.lockout_status().await {
        Some(remaining) => println!("Locked out:       {} seconds remaining", remaining),
        None => println!("Locked out:       no"),
    }

    Ok(())
}
