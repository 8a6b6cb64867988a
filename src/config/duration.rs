//! Human-readable durations for timeout settings ("500ms", "30s", "2m").

use crate::error::{Error, Result};
use std::time::Duration;

/// Parse a duration string.
///
/// Accepts `Nms`, `Ns`, `Nm` and a bare `N` meaning seconds. Returns `None`
/// for anything else, including negative numbers.
///
/// ```
/// use atlas_broker::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("30s"), Some(Duration::from_secs(30)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_duration_string("45"), Some(Duration::from_secs(45)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(n) = s.strip_suffix("ms") {
        n.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix('s') {
        n.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('m') {
        n.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Parse the value of a timeout variable. Zero is rejected: a zero timeout
/// fails every call.
pub fn parse_timeout(key: &str, value: &str) -> Result<Duration> {
    match parse_duration_string(value) {
        Some(d) if d.is_zero() => Err(Error::Config(format!("{} must be greater than zero", key))),
        Some(d) => Ok(d),
        None => Err(Error::Config(format!(
            "{}='{}' is not a duration (expected e.g. 500ms, 30s, 2m)",
            key, value
        ))),
    }
}
