//! Fixed-size rolling window with running mean and variance
//!
//! Values live in a ring buffer; mean and the sum of squared deviations
//! (M2) are updated in O(1) per push using Welford's method, with the
//! sliding variant once the buffer is full. The sliding update carries a
//! bound on its accumulated rounding error; mean and M2 are recomputed from
//! the buffer once per wrap of the ring, and sooner when that bound is no
//! longer negligible against the window's spread (e.g. after a spike leaves).

use crate::models::TimePoint;

use super::series::{is_zero_std, ZScorePoint};

/// Accumulated rounding error tolerated relative to the window's spread
const DRIFT_TOLERANCE: f64 = 1e-9;

/// Ring buffer tracking the mean and population variance of its contents
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buffer: Vec<f64>,
    capacity: usize,
    head: usize,
    len: usize,
    mean: f64,
    m2: f64,
    mean_drift: f64,
    m2_drift: f64,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` values (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            capacity,
            head: 0,
            len: 0,
            mean: 0.0,
            m2: 0.0,
            mean_drift: 0.0,
            m2_drift: 0.0,
        }
    }

    /// Push a value, returning the value it evicted once the window is full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.len < self.capacity {
            self.buffer[(self.head + self.len) % self.capacity] = value;
            self.len += 1;

            let delta = value - self.mean;
            self.mean += delta / self.len as f64;
            self.m2 += delta * (value - self.mean);
            if self.len == self.capacity {
                self.recompute();
            }
            return None;
        }

        let evicted = self.buffer[self.head];
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.capacity;

        if value != evicted {
            let old_mean = self.mean;
            let n = self.capacity as f64;
            self.mean = old_mean + (value - evicted) / n;
            self.m2 += (value - evicted) * (value - self.mean + evicted - old_mean);

            self.mean_drift += f64::EPSILON * (old_mean.abs() + (value.abs() + evicted.abs()) / n);
            self.m2_drift += 2.0
                * f64::EPSILON
                * (value - evicted).abs()
                * ((value - self.mean).abs() + (evicted - old_mean).abs());
        }

        if self.head == 0 || self.drift_exceeds_spread() {
            self.recompute();
        }

        Some(evicted)
    }

    fn drift_exceeds_spread(&self) -> bool {
        let m2 = self.m2.max(0.0);
        let spread = (m2 / self.len as f64).sqrt();
        self.m2_drift > DRIFT_TOLERANCE * m2 || self.mean_drift > DRIFT_TOLERANCE * spread
    }

    /// Two-pass mean and M2 over the current contents
    fn recompute(&mut self) {
        let values = &self.buffer[..self.len];
        let n = self.len as f64;
        let mean = values.iter().sum::<f64>() / n;

        self.mean = mean;
        self.m2 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        self.mean_drift = 0.0;
        self.m2_drift = 0.0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the current contents
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.len > 0).then_some(self.mean)
    }

    /// Population variance of the current contents
    #[must_use]
    pub fn variance(&self) -> Option<f64> {
        (self.len > 0).then(|| (self.m2 / self.len as f64).max(0.0))
    }

    /// Population standard deviation of the current contents
    #[must_use]
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

/// Z-scores against the trailing `window` points (current point included)
///
/// Points before the window fills get `None`; a flat window scores 0.
#[must_use]
pub fn rolling_z_scores(points: &[TimePoint], window: usize) -> Vec<ZScorePoint> {
    let mut rolling = RollingWindow::new(window);

    points
        .iter()
        .map(|p| {
            rolling.push(p.value);

            let z_score = if rolling.is_full() {
                match (rolling.mean(), rolling.std_dev()) {
                    (Some(mean), Some(std_dev)) if !is_zero_std(std_dev, mean) => {
                        Some((p.value - mean) / std_dev)
                    }
                    _ => Some(0.0),
                }
            } else {
                None
            };

            ZScorePoint {
                timestamp: p.timestamp,
                original_value: p.value,
                z_score,
            }
        })
        .collect()
}
