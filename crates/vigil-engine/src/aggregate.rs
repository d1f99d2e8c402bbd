//! Per-channel statistics over an analysis window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::buffer::Window;

/// Mean and sample standard deviation of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Number of present values the statistics were computed from.
    pub count: usize,
}

impl ChannelStats {
    /// Statistics over the given values.
    ///
    /// Zero values yield mean 0 and deviation 0; a single value yields
    /// deviation 0. Otherwise the deviation uses the n-1 sample variance.
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (sum_sq / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            count,
        }
    }
}

/// Statistics for every channel seen in a window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateSet {
    channels: BTreeMap<String, ChannelStats>,
}

impl AggregateSet {
    /// Statistics for a channel, if it appeared in the window.
    pub fn get(&self, channel: &str) -> Option<&ChannelStats> {
        self.channels.get(channel)
    }

    /// Iterate channels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelStats)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel was seen.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Flatten into `{channel}_mean` / `{channel}_std` keys.
    ///
    /// Channels listed in `required` that never appeared are emitted as
    /// zeros.
    pub fn flatten(&self, required: &[&str]) -> BTreeMap<String, f64> {
        let mut flat = BTreeMap::new();
        for channel in required {
            flat.insert(format!("{channel}_mean"), 0.0);
            flat.insert(format!("{channel}_std"), 0.0);
        }
        for (channel, stats) in &self.channels {
            flat.insert(format!("{channel}_mean"), stats.mean);
            flat.insert(format!("{channel}_std"), stats.std_dev);
        }
        flat
    }
}

/// Reduce a window into per-channel statistics over present values.
///
/// Channels whose values are all absent still appear, with zeroed stats.
pub fn compute(window: &Window<'_>) -> AggregateSet {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for reading in window.iter() {
        for (channel, value) in &reading.channels {
            let bucket = values.entry(channel.clone()).or_default();
            if let Some(v) = value {
                bucket.push(*v);
            }
        }
    }

    AggregateSet {
        channels: values
            .into_iter()
            .map(|(channel, vs)| (channel, ChannelStats::from_values(&vs)))
            .collect(),
    }
}
