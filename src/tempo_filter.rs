//! Running statistical estimator that turns a jittery stream of `Clock`
//! arrival timestamps into a stable tempo estimate.
//!
//! The filter holds no locks and is owned entirely by whichever thread
//! feeds it ticks (the receiver's MIDI-input thread); it publishes through
//! whatever the owner does with the returned [`TempoEstimate`].

use std::collections::VecDeque;

use crate::message::TICKS_PER_BEAT;
use crate::time::{self, HostTicks};

/// Number of consecutive outliers that must be observed before the filter
/// concludes the tempo itself changed, rather than a single jittery sample.
const OUTLIER_RUN_RESET: u32 = 4;

/// How many standard deviations from the running mean counts as an outlier.
const OUTLIER_SIGMA: f64 = 3.0;

/// Minimum samples before a tempo estimate is published at all.
const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    /// Beats per minute, after adaptive rounding and hysteresis.
    pub tempo: f64,
    /// Relative standard deviation of recent intervals, as a percentage.
    pub error: f64,
}

/// Default window size: one beat's worth of 24-ppq ticks.
pub const DEFAULT_WINDOW: usize = 24;

pub struct TempoFilter {
    window: usize,
    intervals: VecDeque<f64>,
    last_arrival: Option<HostTicks>,
    published: Option<f64>,
    outlier_run: u32,
}

impl TempoFilter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(MIN_SAMPLES),
            intervals: VecDeque::with_capacity(window),
            last_arrival: None,
            published: None,
            outlier_run: 0,
        }
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_arrival = None;
        self.published = None;
        self.outlier_run = 0;
    }

    /// Feed a new `Clock` arrival timestamp. Returns the current published
    /// estimate once enough samples exist, or `None` before the window has
    /// at least [`MIN_SAMPLES`] intervals.
    pub fn on_tick(&mut self, arrival: HostTicks) -> Option<TempoEstimate> {
        let previous = self.last_arrival.replace(arrival)?;
        if arrival <= previous {
            // Out-of-order or duplicate timestamp; ignore the interval but
            // keep whatever estimate we already have.
            return self.current_estimate();
        }
        let interval = time::ticks_to_seconds(arrival - previous);

        if self.intervals.len() >= MIN_SAMPLES {
            let mean = self.mean();
            let std_dev = self.std_dev(mean);
            if std_dev > 0.0 && (interval - mean).abs() > OUTLIER_SIGMA * std_dev {
                self.outlier_run += 1;
                if self.outlier_run >= OUTLIER_RUN_RESET {
                    // A persistent run of outliers means the tempo itself
                    // changed; flush the window and restart from here.
                    self.intervals.clear();
                    self.outlier_run = 0;
                    self.intervals.push_back(interval);
                }
                return self.current_estimate();
            }
        }

        self.outlier_run = 0;
        self.intervals.push_back(interval);
        while self.intervals.len() > self.window {
            self.intervals.pop_front();
        }
        self.current_estimate()
    }

    /// Relative standard deviation of the current window, as a percentage.
    pub fn error(&self) -> f64 {
        if self.intervals.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        if mean <= 0.0 {
            return 0.0;
        }
        self.std_dev(mean) / mean * 100.0
    }

    pub fn published_tempo(&self) -> Option<f64> {
        self.published
    }

    fn mean(&self) -> f64 {
        self.intervals.iter().sum::<f64>() / self.intervals.len() as f64
    }

    fn std_dev(&self, mean: f64) -> f64 {
        let variance = self
            .intervals
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.intervals.len() as f64;
        variance.sqrt()
    }

    fn current_estimate(&mut self) -> Option<TempoEstimate> {
        if self.intervals.len() < MIN_SAMPLES {
            return None;
        }
        let mean = self.mean();
        if mean <= 0.0 {
            return None;
        }
        let raw_tempo = 60.0 / (mean * TICKS_PER_BEAT as f64);
        let error = self.error();
        let rounded = adaptive_round(raw_tempo, error);

        let changed = match self.published {
            Some(current) => (current - rounded).abs() > f64::EPSILON,
            None => true,
        };
        if changed {
            self.published = Some(rounded);
        }
        self.published.map(|tempo| TempoEstimate { tempo, error })
    }
}

/// Adaptive rounding: tighter precision the more stable the signal is, to
/// suppress oscillation at rounding boundaries.
fn adaptive_round(tempo: f64, error_percent: f64) -> f64 {
    if error_percent < 0.01 {
        (tempo * 100.0).round() / 100.0
    } else if error_percent < 0.1 {
        (tempo * 10.0).round() / 10.0
    } else if error_percent < 5.0 {
        tempo.round()
    } else {
        tempo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_steady(filter: &mut TempoFilter, start: HostTicks, interval_ticks: u64, count: usize) {
        let mut t = start;
        for _ in 0..count {
            filter.on_tick(t);
            t += interval_ticks;
        }
    }

    #[test]
    fn steady_120bpm_locks_to_two_decimals() {
        let mut filter = TempoFilter::new(DEFAULT_WINDOW);
        // 120 BPM => 20833.333us per 24-ppq tick.
        feed_steady(&mut filter, 0, 20_833, 48);
        let estimate = filter.on_tick(48 * 20_833).unwrap();
        assert!((estimate.tempo - 120.0).abs() < 0.05);
        assert!(estimate.error < 0.01);
    }

    #[test]
    fn no_estimate_before_minimum_samples() {
        let mut filter = TempoFilter::new(DEFAULT_WINDOW);
        assert!(filter.on_tick(0).is_none());
        assert!(filter.on_tick(20_833).is_none());
    }

    #[test]
    fn reset_clears_all_state() {
        let mut filter = TempoFilter::new(DEFAULT_WINDOW);
        feed_steady(&mut filter, 0, 20_833, 10);
        assert!(filter.published_tempo().is_some());
        filter.reset();
        assert!(filter.published_tempo().is_none());
        assert!(filter.on_tick(0).is_none());
    }

    #[test]
    fn hysteresis_avoids_flapping_at_rounding_boundary() {
        let mut filter = TempoFilter::new(DEFAULT_WINDOW);
        feed_steady(&mut filter, 0, 20_833, 30);
        let first = filter.published_tempo();
        // Nudge by a sub-rounding-quantum amount; published value should
        // not change merely because the raw estimate wobbled slightly.
        let estimate = filter.on_tick(30 * 20_833 + 20_833).unwrap();
        assert_eq!(Some(estimate.tempo), first);
    }

    #[test]
    fn persistent_outliers_are_treated_as_a_tempo_change() {
        let mut filter = TempoFilter::new(DEFAULT_WINDOW);
        feed_steady(&mut filter, 0, 20_833, 30);
        let slow_interval = 41_666; // roughly half tempo (60 BPM)
        let mut t = 30 * 20_833;
        let mut last = None;
        for _ in 0..10 {
            t += slow_interval;
            last = filter.on_tick(t);
        }
        let estimate = last.unwrap();
        assert!((estimate.tempo - 60.0).abs() < 1.0);
    }
}
