//! The Tap Validator: a pure, per-player function over timing state (spec §4.3)
//!
//! Deliberately free of any dependency on the actor runtime: `validate` takes
//! only the inputs it needs and returns a verdict, so it is unit-testable in
//! isolation from the Matchmaker, the Match, and the transport layer.

use crate::config::MatchConfig;
use crate::matchmaking::error::TapRejection;

/// Result of validating one submitted tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    Accept,
    Reject(TapRejection),
}

/// Validate one submitted tap against the server's wall clock.
///
/// Rules are evaluated in order:
/// 1. Clock skew: `|now - client_timestamp_ms| <= tap_clock_skew_window_ms`.
/// 2. Minimum interval: `now - last_tap_at_ms >= min_tap_interval_ms()`.
///
/// `last_tap_at_ms == None` means "no prior accepted tap", so the interval
/// check is skipped; a prior tap legitimately accepted at server-time `0`
/// still gates the next one, which a `0`-as-sentinel value would not.
pub fn validate(
    last_tap_at_ms: Option<u64>,
    now_ms: u64,
    client_timestamp_ms: u64,
    config: &MatchConfig,
) -> TapVerdict {
    let skew = now_ms.abs_diff(client_timestamp_ms);
    if skew > config.tap_clock_skew_window_ms {
        return TapVerdict::Reject(TapRejection::ClockSkew);
    }

    if let Some(last_tap_at_ms) = last_tap_at_ms {
        let min_interval = config.min_tap_interval_ms();
        if now_ms.saturating_sub(last_tap_at_ms) < min_interval {
            return TapVerdict::Reject(TapRejection::RateLimited);
        }
    }

    TapVerdict::Accept
}
