use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing_subscriber::{EnvFilter, fmt};

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

/// Epoch millis as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn iso_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn system_time_millis(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Share of `used` against `capacity`, rounded and clamped to 0..=100.
pub fn fill_percent(used: i64, capacity: usize) -> u8 {
    if capacity == 0 {
        return 100;
    }
    let pct = (used as f64 / capacity as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
