use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kids' device parental controls
///
/// Guards the parent settings behind a PIN, locks volume, brightness and
/// screen time, and rate-limits interstitial ads. Device access is simulated.
#[derive(Parser, Debug)]
#[command(name = "kids-guard")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parent PIN management
    Pin {
        #[command(subcommand)]
        command: PinCommands,
    },
    /// Show or change locked settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Background enforcement service
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
    /// Interstitial ad rate limit
    Ad {
        #[command(subcommand)]
        command: AdCommands,
    },
    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Resume enforcement and hold locked settings until Ctrl+C
    Run {
        /// Seconds between enforcement checks
        #[arg(long, default_value = "5")]
        tick: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PinCommands {
    /// Set the parent PIN for the first time
    Setup {
        /// New 4-digit PIN
        pin: String,
    },
    /// Check a PIN (counts toward lockout)
    Verify {
        pin: String,
    },
    /// Replace the parent PIN
    Change {
        /// Current PIN
        old: String,
        /// New 4-digit PIN
        new: String,
    },
    /// Show PIN and lockout status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show all settings
    Show,
    /// Change a setting (requires the parent PIN)
    Set {
        /// volume, brightness or screen-time
        setting: String,

        /// Percent for volume/brightness, minutes for screen-time
        #[arg(allow_negative_numbers = true)]
        value: i64,

        /// Lock the setting at this value
        #[arg(long)]
        lock: bool,

        /// Parent PIN
        #[arg(long)]
        pin: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Show service status
    Status,
    /// Start the service after a failed start
    Retry,
    /// Stop the service
    Stop,
}

#[derive(Subcommand, Debug)]
pub enum AdCommands {
    /// Check whether an ad may be shown now
    Check,
    /// Record that an ad was just shown
    Record,
    /// Show an ad if the rate limit allows it
    Show,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings_set() {
        let args = Args::try_parse_from([
            "kids-guard", "settings", "set", "volume", "-10", "--lock", "--pin", "1234",
        ])
        .unwrap();

        match args.command {
            Commands::Settings {
                command: SettingsCommands::Set { setting, value, lock, pin },
            } => {
                assert_eq!(setting, "volume");
                assert_eq!(value, -10);
                assert!(lock);
                assert_eq!(pin, "1234");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "kids-guard", "pin", "status", "--verbose", "--config", "/tmp/guard.toml",
        ])
        .unwrap();

        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/guard.toml")));
    }

    #[test]
    fn test_run_default_tick() {
        let args = Args::try_parse_from(["kids-guard", "run"]).unwrap();
        assert!(matches!(args.command, Commands::Run { tick: 5 }));
    }
}
