//! Timing policy for the polling scheduler.
//!
//! Pure functions so the grace-period and timeout rules can be tested
//! without a clock, a store, or a running loop.

use chrono::Duration;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Seconds between scheduler ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Seconds a request may stay RUNNING before the scheduler fails it.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 900;

/// Seconds after a webhook receipt during which polling skips a request.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 60;

/// Maximum concurrent per-request status checks within one tick.
pub const DEFAULT_POLL_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Whether a webhook landed recently enough that polling should skip the
/// request this tick.
///
/// The window is half-open: a tick at exactly `received_at + grace` polls.
pub fn within_grace_period(
    webhook_received_at: Option<Timestamp>,
    now: Timestamp,
    grace: Duration,
) -> bool {
    match webhook_received_at {
        Some(received_at) => now < received_at + grace,
        None => false,
    }
}

/// Whether a request dispatched at `dispatched_at` has exceeded the timeout.
///
/// Measured from the RUNNING transition, so the result is the same across
/// process restarts. A tick at exactly `dispatched_at + timeout` times out.
pub fn has_timed_out(dispatched_at: Timestamp, now: Timestamp, timeout: Duration) -> bool {
    now - dispatched_at >= timeout
}

/// Upper bound for configured durations (ten years).
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 3600;

/// Convert a whole number of seconds from configuration into a chrono
/// duration, saturating at [`MAX_DURATION_SECS`].
pub fn secs(value: u64) -> Duration {
    let value = i64::try_from(value).unwrap_or(i64::MAX).min(MAX_DURATION_SECS);
    Duration::seconds(value)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn no_webhook_never_in_grace() {
        assert!(!within_grace_period(None, t0(), secs(60)));
    }

    #[test]
    fn tick_before_grace_end_is_skipped() {
        let received = Some(t0());
        assert!(within_grace_period(received, t0(), secs(60)));
        assert!(within_grace_period(received, t0() + secs(59), secs(60)));
    }

    #[test]
    fn tick_at_or_after_grace_end_polls() {
        let received = Some(t0());
        assert!(!within_grace_period(received, t0() + secs(60), secs(60)));
        assert!(!within_grace_period(received, t0() + secs(3600), secs(60)));
    }

    #[test]
    fn zero_grace_never_skips() {
        assert!(!within_grace_period(Some(t0()), t0(), secs(0)));
    }

    #[test]
    fn timeout_not_reached_before_deadline() {
        assert!(!has_timed_out(t0(), t0() + secs(899), secs(900)));
        assert!(!has_timed_out(t0(), t0() + secs(870), secs(900)));
    }

    #[test]
    fn timeout_reached_at_and_after_deadline() {
        assert!(has_timed_out(t0(), t0() + secs(900), secs(900)));
        assert!(has_timed_out(t0(), t0() + secs(930), secs(900)));
    }

    #[test]
    fn secs_saturates() {
        assert_eq!(secs(30).num_seconds(), 30);
        assert_eq!(secs(u64::MAX).num_seconds(), MAX_DURATION_SECS);
    }
}
