//! Anomaly score history and time-to-threshold countdown.
//!
//! The countdown is a trend-following heuristic, not a physical model of the
//! asset: it extrapolates the recent slope of the scaled autoencoder score and
//! assumes every sample is one polling interval apart. It should be presented
//! as an approximation.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrendConfig;

/// One recorded anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEntry {
    pub t: DateTime<Utc>,
    pub ae_scaled: f64,
}

/// Bounded series of scaled anomaly scores, oldest first.
#[derive(Debug, Clone)]
pub struct AnomalyHistory {
    entries: VecDeque<AnomalyEntry>,
    capacity: usize,
}

impl AnomalyHistory {
    /// Create an empty history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a score stamped with the current time.
    pub fn record(&mut self, ae_scaled: f64) {
        self.record_at(Utc::now(), ae_scaled);
    }

    /// Record a score at an explicit time.
    pub fn record_at(&mut self, t: DateTime<Utc>, ae_scaled: f64) {
        self.entries.push_back(AnomalyEntry { t, ae_scaled });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &AnomalyEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&AnomalyEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Ordinary least-squares slope of `values` against their index.
///
/// Returns 0 for fewer than two values.
pub fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;

    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }

    num / den
}

// Slopes this close to zero are float noise from a flat series.
const FLAT_SLOPE: f64 = 1e-12;

/// Estimates seconds until fused risk reaches 1 from the anomaly trend.
#[derive(Debug, Clone)]
pub struct CountdownEstimator {
    poll_interval: Duration,
    sample_count: usize,
    min_samples: usize,
}

impl CountdownEstimator {
    pub fn new(poll_interval: Duration, sample_count: usize, min_samples: usize) -> Self {
        Self {
            poll_interval,
            sample_count,
            min_samples,
        }
    }

    pub fn from_config(poll_interval: Duration, config: &TrendConfig) -> Self {
        Self::new(poll_interval, config.sample_count, config.min_samples)
    }

    /// Seconds until threshold, or `None` when the trend is too short, flat,
    /// or improving.
    ///
    /// The slope is fitted against sample index rather than wall-clock time,
    /// so skipped ticks compress the apparent trend. Positive slopes up to
    /// `1e-12` per sample count as flat, so a constant series carrying float
    /// rounding never yields a countdown.
    pub fn estimate(&self, history: &AnomalyHistory, current_fused_risk: f64) -> Option<u64> {
        let recent: Vec<f64> = history
            .recent(self.sample_count)
            .map(|e| e.ae_scaled)
            .collect();
        if recent.len() < self.min_samples {
            return None;
        }

        let slope = least_squares_slope(&recent);
        if slope.is_nan() || slope <= FLAT_SLOPE {
            return None;
        }

        let steps_needed = (1.0 - current_fused_risk) / slope;
        let secs = (steps_needed * self.poll_interval.as_millis() as f64 / 1000.0).round();
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }

        Some(secs as u64)
    }
}
