use serde::Serialize;

/// Screen-time budget versus what has been used since the lock was engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenTimeUsage {
    pub limit_minutes: u32,
    pub locked: bool,
    pub daily_usage_seconds: u64,
    pub remaining_seconds: u64,
    pub expired: bool,
}

impl ScreenTimeUsage {
    pub fn compute(limit_minutes: u32, locked: bool, daily_usage_seconds: u64) -> Self {
        let remaining_seconds = limit_seconds(limit_minutes).saturating_sub(daily_usage_seconds);
        Self {
            limit_minutes,
            locked,
            daily_usage_seconds,
            remaining_seconds,
            expired: remaining_seconds == 0,
        }
    }
}

pub fn limit_seconds(limit_minutes: u32) -> u64 {
    u64::from(limit_minutes) * 60
}

/// Format seconds as `1h 5m` or `5m`
pub fn format_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Format minutes as `2h`, `2h 30m` or `45m`
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
