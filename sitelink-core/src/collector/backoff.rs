//! Reconnect backoff schedule
//!
//! Steps up with the number of recorded connection attempts:
//! hourly for the first attempts, then twice a day, daily, every three days,
//! and finally weekly.

use std::time::Duration;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long to wait before another connection attempt, given how many
/// attempts have been recorded so far.
pub fn throttle_interval(attempts: u32) -> Duration {
    match attempts {
        0..=4 => HOUR,
        5..=10 => 12 * HOUR,
        11..=13 => DAY,
        14..=16 => 3 * DAY,
        _ => WEEK,
    }
}
