use std::time::Duration;

use crate::instant::Instant;

pub(crate) fn time_until_stale(updated_at: Instant, window: Duration, now: Instant) -> Duration {
    let updated_at = updated_at.0.as_millis() as i64;
    let now = now.0.as_millis() as i64;
    let window = window.as_millis() as i64;
    let result = (updated_at + window) - now;
    let ensure_non_negative = result.max(0);
    Duration::from_millis(ensure_non_negative as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_time_before_window_elapses() {
        let updated_at = Instant(Duration::from_secs(100));
        let now = Instant(Duration::from_secs(130));
        let remaining = time_until_stale(updated_at, Duration::from_secs(60), now);
        assert_eq!(remaining, Duration::from_secs(30));
    }

    #[test]
    fn zero_once_window_has_elapsed() {
        let updated_at = Instant(Duration::from_secs(100));
        let now = Instant(Duration::from_secs(500));
        let remaining = time_until_stale(updated_at, Duration::from_secs(60), now);
        assert!(remaining.is_zero());
    }
}
