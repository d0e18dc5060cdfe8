use anyhow::Result;

use super::GuardContext;
use crate::cli::ServiceCommands;

pub async fn run_service_command(command: ServiceCommands, ctx: &GuardContext) -> Result<()> {
    ctx.coordinator.initialize().await;

    match command {
        ServiceCommands::Status => status(ctx).await,
        ServiceCommands::Retry => {
            if !ctx.coordinator.force_start_service().await {
                anyhow::bail!("Enforcement service failed to start");
            }
            println!("✓ Enforcement service started");
            Ok(())
        }
        ServiceCommands::Stop => {
            if !ctx.coordinator.force_stop_service().await {
                anyhow::bail!("Enforcement service failed to stop");
            }
            println!("✓ Enforcement service stopped");
            Ok(())
        }
    }
}

async fn status(ctx: &GuardContext) -> Result<()> {
    let status = ctx.coordinator.service_status().await;

    println!("Enforcement Service Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Running:      {}", if ctx.coordinator.is_service_running().await { "yes" } else { "no" });

    if status.needed_by.is_empty() {
        println!("Needed by:    nothing is locked");
    } else {
        let names: Vec<&str> = status.needed_by.iter().map(|kind| kind.name()).collect();
        println!("Needed by:    {}", names.join(", "));
    }

    if status.start_failed {
        println!();
        println!("Last start failed. Run 'kids-guard service retry' to try again.");
    }

    Ok(())
}
