use anyhow::Result;
use async_trait::async_trait;

use kids_guard::parental::{AdDelivery, AdTrigger};

use super::GuardContext;
use super::utils::format_wait;
use crate::cli::AdCommands;

/// Prints a placeholder in place of a real interstitial
struct ConsoleAd;

#[async_trait]
impl AdDelivery for ConsoleAd {
    async fn show(&self) -> Result<bool> {
        println!("┌──────────────────────────────┐");
        println!("│        [ interstitial ]      │");
        println!("└──────────────────────────────┘");
        Ok(true)
    }
}

pub async fn run_ad_command(command: AdCommands, ctx: &GuardContext) -> Result<()> {
    match command {
        AdCommands::Check => {
            if ctx.ads.can_fire().await {
                println!("✓ An ad may be shown now");
            } else {
                match ctx.ads.time_until_eligible().await {
                    Some(wait) => println!("Next ad allowed in {}", format_wait(wait)),
                    None => println!("Ad eligibility could not be determined"),
                }
            }
            Ok(())
        }
        AdCommands::Record => {
            ctx.ads.record_fired().await?;
            println!("✓ Recorded ad shown; next one allowed in {}", format_wait(ctx.ads.interval()));
            Ok(())
        }
        AdCommands::Show => {
            if ctx.ads.fire_if_eligible(AdTrigger::AppForeground, &ConsoleAd).await {
                println!("✓ Ad shown");
            } else {
                println!("No ad shown (rate limited)");
            }
            Ok(())
        }
    }
}
