use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Args, Commands};
use commands::GuardContext;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    commands::utils::init_logging(args.verbose);

    let command = args.command;
    let config_path = args.config.as_deref();
    let load = || GuardContext::load(config_path);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match command {
            Commands::Pin { command } => commands::run_pin_command(command, &load()?).await,
            Commands::Settings { command } => commands::run_settings_command(command, &load()?).await,
            Commands::Service { command } => commands::run_service_command(command, &load()?).await,
            Commands::Ad { command } => commands::run_ad_command(command, &load()?).await,
            Commands::Run { tick } => commands::run_guard(&load()?, tick).await,
            // Works without loading the config, so a broken file can be replaced
            Commands::Config { command } => commands::run_config_command(command, config_path),
        }
    })
}
