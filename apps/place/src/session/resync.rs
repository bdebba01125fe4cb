//! Periodic full-snapshot scheduling.

use chrono::Timelike;
use std::time::Duration;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Shortest period accepted; `tokio::time::interval` rejects zero.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Delay that lands one second before the next 10-second wall-clock boundary,
/// given the current second of the minute.
pub fn alignment_delay(second: u32) -> Duration {
    let remaining = (60 - second.min(59)) % 10;
    Duration::from_secs(u64::from(remaining.saturating_sub(1)))
}

/// Time until the first recurring resync, measured from now.
pub fn first_resync_in(period: Duration) -> Duration {
    alignment_delay(chrono::Local::now().second()) + period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_to_ten_second_boundary() {
        assert_eq!(alignment_delay(0), Duration::ZERO);
        assert_eq!(alignment_delay(1), Duration::from_secs(8));
        assert_eq!(alignment_delay(7), Duration::from_secs(2));
        assert_eq!(alignment_delay(9), Duration::ZERO);
        assert_eq!(alignment_delay(10), Duration::ZERO);
        assert_eq!(alignment_delay(55), Duration::from_secs(4));
    }

    #[test]
    fn never_exceeds_nine_seconds_past_period() {
        for second in 0..60 {
            let delay = alignment_delay(second);
            assert!(delay < Duration::from_secs(9), "second {second}");
        }
        assert!(first_resync_in(DEFAULT_PERIOD) >= DEFAULT_PERIOD);
    }

    #[test]
    fn leap_second_is_clamped() {
        assert_eq!(alignment_delay(60), alignment_delay(59));
    }
}
