//! Host-tick time base: the monotonic clock underlying every deadline and
//! position computation in the engine.
//!
//! All components that need "now" go through [`now`] rather than
//! `Instant::now()` directly, so that tests can reason in plain ticks without
//! threading a real clock through every call.

use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic host-tick count. Unsigned so it never goes negative; wraps only
/// after ~580,000 years at microsecond resolution.
pub type HostTicks = u64;

/// Ticks per second of the host clock. Fixed for the lifetime of the
/// process at microsecond resolution — at least that precision is needed
/// to keep tick arithmetic from rounding away real tempo jitter.
pub const TICKS_PER_SECOND: u64 = 1_000_000;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Current monotonic timestamp, in host ticks since process start.
pub fn now() -> HostTicks {
    seconds_to_ticks(epoch().elapsed().as_secs_f64())
}

/// Convert a duration in host ticks to seconds.
pub fn ticks_to_seconds(ticks: HostTicks) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Convert a duration in seconds to host ticks.
pub fn seconds_to_ticks(seconds: f64) -> HostTicks {
    (seconds * TICKS_PER_SECOND as f64).round() as HostTicks
}

/// Convert seconds to beats (quarter notes) at the given tempo.
///
/// # Panics
/// Panics if `tempo` is not strictly positive — dividing by a zero or
/// negative tempo is a caller bug, not a recoverable runtime condition.
pub fn seconds_to_beats(seconds: f64, tempo: f64) -> f64 {
    assert!(tempo > 0.0, "tempo must be positive, got {tempo}");
    seconds * tempo / 60.0
}

/// Convert beats (quarter notes) to seconds at the given tempo.
///
/// # Panics
/// Panics if `tempo` is not strictly positive.
pub fn beats_to_seconds(beats: f64, tempo: f64) -> f64 {
    assert!(tempo > 0.0, "tempo must be positive, got {tempo}");
    beats * 60.0 / tempo
}

/// Convert a host-tick timestamp to beats at the given tempo.
pub fn ticks_to_beats(ticks: HostTicks, tempo: f64) -> f64 {
    seconds_to_beats(ticks_to_seconds(ticks), tempo)
}

/// Convert a beat position to a host-tick duration at the given tempo.
pub fn beats_to_ticks(beats: f64, tempo: f64) -> HostTicks {
    seconds_to_ticks(beats_to_seconds(beats, tempo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_seconds_ticks() {
        let ticks = seconds_to_ticks(1.5);
        assert_eq!(ticks, 1_500_000);
        assert!((ticks_to_seconds(ticks) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn beats_and_seconds_are_inverse_at_fixed_tempo() {
        let tempo = 120.0;
        let beats = seconds_to_beats(2.0, tempo);
        assert!((beats - 4.0).abs() < 1e-9);
        let seconds = beats_to_seconds(beats, tempo);
        assert!((seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "tempo must be positive")]
    fn guards_against_zero_tempo() {
        seconds_to_beats(1.0, 0.0);
    }

    #[test]
    fn now_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }
}
