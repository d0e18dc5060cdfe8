use anyhow::Result;
use std::path::Path;

use kids_guard::config::{GuardConfig, get_config_path, load_config, save_config};

use crate::cli::ConfigCommands;

pub fn run_config_command(command: ConfigCommands, config_path: Option<&Path>) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => get_config_path()?,
    };

    match command {
        ConfigCommands::Init { force } => init(&config_path, force),
        ConfigCommands::Show => show(&config_path),
    }
}

/// Write the default configuration file
fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    save_config(config_path, &GuardConfig::default())?;

    println!("✓ Created configuration file: {}", config_path.display());
    println!("\nEdit this file to change lockout, ad and screen time limits.");
    Ok(())
}

fn show(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("# {}", config_path.display());
    if !config_path.exists() {
        println!("# (file not found, showing defaults)");
    }
    println!("# data directory: {}", config.resolve_data_dir()?.display());
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
