use std::time::Duration;

use kids_guard::parental::{SettingKind, format_minutes, format_seconds};

/// Initialize logging
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Format a setting value with its unit
pub fn format_value(kind: SettingKind, value: u32) -> String {
    if kind.is_level() {
        format!("{}%", value)
    } else {
        format_minutes(value)
    }
}

/// Format a wait for display, rounding up to the next minute
pub fn format_wait(duration: Duration) -> String {
    format_seconds(duration.as_secs().div_ceil(60) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(SettingKind::Volume, 70), "70%");
        assert_eq!(format_value(SettingKind::ScreenTime, 90), "1h 30m");
    }

    #[test]
    fn test_format_wait_rounds_up() {
        assert_eq!(format_wait(Duration::from_secs(1)), "1m");
        assert_eq!(format_wait(Duration::from_secs(6 * 3600)), "6h 0m");
    }
}
