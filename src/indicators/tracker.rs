use std::collections::HashMap;

use super::base::TrailingIndicator;
use super::patterns::population_std;
use crate::common::ring_buffer::RingBuffer;
use crate::error::{MonitorError, Result};

/// Samples the buffer must hold before a volatility is reported.
pub const MIN_SAMPLES: usize = 5;

/// Rolling population standard deviation over the most recent `window_size` scores.
///
/// Holds mutable state and is not meant to be shared between threads without a
/// lock; use one tracker per stream (see [`GroupTrackers`]).
#[derive(Debug, Clone)]
pub struct VolatilityTracker {
    buffer: RingBuffer,
}

impl VolatilityTracker {
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(MonitorError::InvalidWindow);
        }
        Ok(Self {
            buffer: RingBuffer::new(window_size),
        })
    }

    /// Pushes a score and returns the volatility of the current window.
    ///
    /// Returns 0.0 until the window holds at least [`MIN_SAMPLES`] scores, so a
    /// tracker whose window is smaller than that always reports 0.0.
    pub fn update(&mut self, score: f64) -> f64 {
        self.add_sample(score);
        self.calculate_indicator()
    }

    pub fn current(&self) -> f64 {
        self.calculate_indicator()
    }

    pub fn is_warm(&self) -> bool {
        self.buffer.len() >= MIN_SAMPLES
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.buffer.capacity()
    }
}

impl TrailingIndicator for VolatilityTracker {
    fn calculate_indicator(&self) -> f64 {
        if !self.is_warm() {
            return 0.0;
        }
        population_std(self.buffer.iter())
    }

    fn add_sample(&mut self, value: f64) {
        self.buffer.push(value);
    }

    fn sample_count(&self) -> usize {
        self.buffer.len()
    }
}

/// One tracker per partition key, created on first use.
#[derive(Debug)]
pub struct GroupTrackers {
    window_size: usize,
    trackers: HashMap<String, VolatilityTracker>,
}

impl GroupTrackers {
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(MonitorError::InvalidWindow);
        }
        Ok(Self {
            window_size,
            trackers: HashMap::new(),
        })
    }

    pub fn update(&mut self, group: &str, score: f64) -> Result<f64> {
        if let Some(tracker) = self.trackers.get_mut(group) {
            return Ok(tracker.update(score));
        }
        let mut tracker = VolatilityTracker::new(self.window_size)?;
        let vol = tracker.update(score);
        self.trackers.insert(group.to_string(), tracker);
        Ok(vol)
    }

    pub fn get(&self, group: &str) -> Option<&VolatilityTracker> {
        self.trackers.get(group)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

/// Runs a fresh tracker over `scores`, returning the rolling volatility after each one.
pub fn rolling_volatility(scores: &[f64], window_size: usize) -> Result<Vec<f64>> {
    let mut tracker = VolatilityTracker::new(window_size)?;
    Ok(scores.iter().map(|&s| tracker.update(s)).collect())
}
