//! Bounded telemetry buffer.
//!
//! A single ring of readings holds the retained history; the analysis window
//! is a borrowed view over its tail, never a second copy.

use std::collections::VecDeque;

use crate::config::WindowConfig;
use crate::types::Reading;

/// Bounded FIFO of readings with a fixed-length analysis window.
#[derive(Debug, Clone)]
pub struct SlidingWindowBuffer {
    readings: VecDeque<Reading>,
    window_len: usize,
    capacity: usize,
}

impl SlidingWindowBuffer {
    /// Create a buffer with window length `window_len` retaining
    /// `window_len * retention_multiplier` readings.
    pub fn new(window_len: usize, retention_multiplier: usize) -> Self {
        let capacity = window_len.saturating_mul(retention_multiplier).max(window_len);
        Self {
            readings: VecDeque::with_capacity(capacity),
            window_len,
            capacity,
        }
    }

    /// Create a buffer from configuration.
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.length, config.retention_multiplier)
    }

    /// Append a reading, evict from the front past capacity, and return the
    /// current window.
    pub fn push(&mut self, reading: Reading) -> Window<'_> {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
        self.window()
    }

    /// The most recent `window_len` readings (fewer before warm-up).
    pub fn window(&self) -> Window<'_> {
        let skip = self.readings.len().saturating_sub(self.window_len);
        let (front, back) = self.readings.as_slices();
        if skip < front.len() {
            Window {
                head: &front[skip..],
                tail: back,
            }
        } else {
            Window {
                head: &back[skip - front.len()..],
                tail: &[],
            }
        }
    }

    /// Number of retained readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether nothing has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Whether the window has reached its full analysis length.
    pub fn is_warm(&self) -> bool {
        self.readings.len() >= self.window_len
    }

    /// Analysis window length.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Retained buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained readings, oldest first.
    pub fn retained(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Most recent reading.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Drop every retained reading.
    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Read-only view of the analysis window, most recent last.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    head: &'a [Reading],
    tail: &'a [Reading],
}

impl<'a> Window<'a> {
    /// Number of readings in the window.
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    /// Whether the window holds no readings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Readings oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &'a Reading> + 'a {
        self.head.iter().chain(self.tail.iter())
    }

    /// Most recent reading.
    pub fn latest(&self) -> Option<&'a Reading> {
        self.tail.last().or_else(|| self.head.last())
    }

    /// Owned copy of the window.
    pub fn to_vec(&self) -> Vec<Reading> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetId, TEMPERATURE};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn reading(i: i64) -> Reading {
        Reading::new(
            AssetId::new("pump-1"),
            Utc.timestamp_millis_opt(i * 2_000).unwrap(),
        )
        .with_channel(TEMPERATURE, Some(i as f64))
    }

    fn temps(window: &Window<'_>) -> Vec<f64> {
        window.iter().filter_map(|r| r.value(TEMPERATURE)).collect()
    }

    #[test]
    fn test_warm_up_returns_everything() {
        let mut buffer = SlidingWindowBuffer::new(3, 4);
        assert!(buffer.window().is_empty());

        let window = buffer.push(reading(0));
        assert_eq!(window.len(), 1);
        buffer.push(reading(1));
        assert!(!buffer.is_warm());

        let window = buffer.push(reading(2));
        assert_eq!(temps(&window), vec![0.0, 1.0, 2.0]);
        assert!(buffer.is_warm());
    }

    #[test]
    fn test_window_is_tail_of_retained() {
        let mut buffer = SlidingWindowBuffer::new(3, 2);
        for i in 0..5 {
            buffer.push(reading(i));
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(temps(&buffer.window()), vec![2.0, 3.0, 4.0]);
        assert_eq!(
            buffer.latest().and_then(|r| r.value(TEMPERATURE)),
            Some(4.0)
        );
    }

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let mut buffer = SlidingWindowBuffer::new(2, 2);
        for i in 0..10 {
            buffer.push(reading(i));
        }

        assert_eq!(buffer.len(), 4);
        let retained: Vec<f64> = buffer
            .retained()
            .filter_map(|r| r.value(TEMPERATURE))
            .collect();
        assert_eq!(retained, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(temps(&buffer.window()), vec![8.0, 9.0]);
    }

    #[test]
    fn test_absent_values_preserved() {
        let mut buffer = SlidingWindowBuffer::new(2, 4);
        let gap = Reading::new(AssetId::new("pump-1"), Utc::now()).with_channel(TEMPERATURE, None);

        let window = buffer.push(gap);
        let latest = window.latest().unwrap();
        assert!(latest.channels.contains_key(TEMPERATURE));
        assert_eq!(latest.value(TEMPERATURE), None);
    }

    #[test]
    fn test_clear_resets() {
        let mut buffer = SlidingWindowBuffer::new(2, 4);
        buffer.push(reading(0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.window().is_empty());
    }

    proptest! {
        #[test]
        fn property_lengths_stay_bounded(
            window_len in 1usize..20,
            multiplier in 1usize..6,
            pushes in 0usize..200,
        ) {
            let mut buffer = SlidingWindowBuffer::new(window_len, multiplier);
            for i in 0..pushes {
                let window_size = buffer.push(reading(i as i64)).len();
                prop_assert!(window_size <= window_len);
                prop_assert!(buffer.len() <= window_len * multiplier);
                prop_assert_eq!(window_size, (i + 1).min(window_len));
            }
        }

        #[test]
        fn property_window_ends_with_latest(pushes in 1usize..100) {
            let mut buffer = SlidingWindowBuffer::new(7, 3);
            for i in 0..pushes {
                buffer.push(reading(i as i64));
            }
            let window = buffer.window();
            let last = window.latest().and_then(|r| r.value(TEMPERATURE));
            prop_assert_eq!(last, Some((pushes - 1) as f64));
            let values = temps(&window);
            prop_assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
