//! Filtered pressure channels.
//!
//! Engineering-unit readings come in through [`PressurePort`] (calibration
//! happens upstream). Each channel applies an optional prefilter (median-3
//! or EMA) and a one-second moving average, accepting at most one sample
//! per sample interval. Consumers always read the latest filtered value and
//! never block waiting for a new sample.

use splitter_common::config::{FilterMode, PressureConfig};
use splitter_common::consts::{Millis, PRESSURE_SAMPLE_INTERVAL_MS, PRESSURE_SAMPLE_WINDOW};
use splitter_common::io::PressureChannel;

/// Latest engineering-unit reading per analog channel, non-blocking.
pub trait PressurePort {
    fn read_psi(&mut self, channel: PressureChannel) -> f32;
}

/// One filtered pressure channel.
#[derive(Debug, Clone)]
pub struct FilteredChannel {
    mode: FilterMode,
    ema_alpha: f32,
    ema: Option<f32>,
    median_prev: Option<[f32; 2]>,
    window: [f32; PRESSURE_SAMPLE_WINDOW],
    window_index: usize,
    window_filled: usize,
    window_sum: f32,
    last_sample_at: Option<Millis>,
    value: f32,
}

impl FilteredChannel {
    pub fn new(config: &PressureConfig) -> Self {
        Self {
            mode: config.filter,
            ema_alpha: config.ema_alpha,
            ema: None,
            median_prev: None,
            window: [0.0; PRESSURE_SAMPLE_WINDOW],
            window_index: 0,
            window_filled: 0,
            window_sum: 0.0,
            last_sample_at: None,
            value: 0.0,
        }
    }

    /// Apply new filter settings, discarding accumulated filter state.
    pub fn reconfigure(&mut self, config: &PressureConfig) {
        *self = Self::new(config);
    }

    /// Latest filtered value [PSI].
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Whether at least one sample has been accepted.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.window_filled > 0
    }

    /// Offer a raw reading. Accepted only when the sample interval has
    /// elapsed since the last accepted sample.
    pub fn ingest(&mut self, raw_psi: f32, now: Millis) {
        if !raw_psi.is_finite() {
            return;
        }
        if let Some(last) = self.last_sample_at {
            if now.saturating_sub(last) < PRESSURE_SAMPLE_INTERVAL_MS {
                return;
            }
        }
        self.last_sample_at = Some(now);

        let filtered = self.apply_filter(raw_psi);

        if self.window_filled == PRESSURE_SAMPLE_WINDOW {
            self.window_sum -= self.window[self.window_index];
        } else {
            self.window_filled += 1;
        }
        self.window[self.window_index] = filtered;
        self.window_sum += filtered;
        self.window_index = (self.window_index + 1) % PRESSURE_SAMPLE_WINDOW;

        self.value = self.window_sum / self.window_filled as f32;
    }

    fn apply_filter(&mut self, raw: f32) -> f32 {
        match self.mode {
            FilterMode::None => raw,
            FilterMode::Median3 => {
                let [a, b] = self.median_prev.unwrap_or([raw, raw]);
                self.median_prev = Some([raw, a]);
                median3(raw, a, b)
            }
            FilterMode::Ema => {
                let ema = match self.ema {
                    Some(prev) => self.ema_alpha * raw + (1.0 - self.ema_alpha) * prev,
                    None => raw,
                };
                self.ema = Some(ema);
                ema
            }
        }
    }
}

fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.max(b.min(c)).min(b.max(c))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(mode: FilterMode) -> FilteredChannel {
        FilteredChannel::new(&PressureConfig {
            filter: mode,
            ema_alpha: 0.5,
        })
    }

    /// Ingest one sample per sample interval.
    fn feed(ch: &mut FilteredChannel, values: &[f32]) {
        for (i, v) in values.iter().enumerate() {
            ch.ingest(*v, i as Millis * PRESSURE_SAMPLE_INTERVAL_MS);
        }
    }

    #[test]
    fn starts_not_ready() {
        let ch = channel(FilterMode::None);
        assert!(!ch.is_ready());
        assert_eq!(ch.value(), 0.0);
    }

    #[test]
    fn unfiltered_average_over_window() {
        let mut ch = channel(FilterMode::None);
        feed(&mut ch, &[100.0, 200.0, 300.0]);
        assert!(ch.is_ready());
        assert!((ch.value() - 200.0).abs() < 1e-3);
    }

    #[test]
    fn window_slides_after_fill() {
        let mut ch = channel(FilterMode::None);
        let samples: std::vec::Vec<f32> = (0..PRESSURE_SAMPLE_WINDOW + 5).map(|_| 50.0).collect();
        feed(&mut ch, &samples);
        assert!((ch.value() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn samples_inside_interval_are_dropped() {
        let mut ch = channel(FilterMode::None);
        ch.ingest(100.0, 0);
        // Too soon — ignored.
        ch.ingest(9_999.0, PRESSURE_SAMPLE_INTERVAL_MS / 2);
        assert!((ch.value() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn median3_rejects_single_spike() {
        let mut ch = channel(FilterMode::Median3);
        feed(&mut ch, &[100.0, 100.0, 5_000.0, 100.0, 100.0]);
        // The spike never survives the median.
        assert!(ch.value() < 200.0);
    }

    #[test]
    fn ema_tracks_toward_input() {
        let mut ch = channel(FilterMode::Ema);
        feed(&mut ch, &[0.0, 1_000.0]);
        // alpha 0.5: second filtered sample is 500; average of (0, 500).
        assert!((ch.value() - 250.0).abs() < 1e-3);
    }

    #[test]
    fn non_finite_samples_ignored() {
        let mut ch = channel(FilterMode::None);
        ch.ingest(f32::NAN, 0);
        assert!(!ch.is_ready());
        ch.ingest(100.0, PRESSURE_SAMPLE_INTERVAL_MS);
        assert!((ch.value() - 100.0).abs() < 1e-3);
    }
}
