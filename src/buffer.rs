//! Rolling observation window feeding the model.
//!
//! The window is always full: it is seeded with a neutral filler at
//! construction so the first prediction is well-defined before any real
//! observation arrives.

use std::collections::VecDeque;

use crate::config::N_FEATURES;
use crate::features::Observation;

/// A generic rolling buffer with fixed capacity.
///
/// Backed by a ring buffer so pushes never reallocate once the buffer is full.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingBuffer<T> {
    /// Create an empty rolling buffer with the specified capacity.
    ///
    /// # Example
    /// ```
    /// use envcast::RollingBuffer;
    /// let buffer: RollingBuffer<f32> = RollingBuffer::new(4);
    /// assert!(buffer.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a new element, evicting the oldest when at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over all elements, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }
}

impl<T: Clone> RollingBuffer<T> {
    /// Create a buffer already filled to capacity with `value`.
    pub fn filled(capacity: usize, value: T) -> Self {
        let mut buffer = Self::new(capacity);
        for _ in 0..capacity {
            buffer.push(value.clone());
        }
        buffer
    }

    /// All elements, oldest to newest.
    pub fn to_vec(&self) -> Vec<T> {
        self.buffer.iter().cloned().collect()
    }
}

/// Fixed-length FIFO of the most recent observations.
///
/// Length is always exactly `window_size`.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    observations: RollingBuffer<Observation>,
}

impl FeatureWindow {
    /// Create a window pre-filled with `filler`.
    ///
    /// # Example
    /// ```
    /// use envcast::{FeatureWindow, Observation};
    /// let window = FeatureWindow::new(4, Observation::new(20.0, 50.0, 0.5));
    /// assert_eq!(window.flatten().len(), 12);
    /// ```
    pub fn new(window_size: usize, filler: Observation) -> Self {
        Self {
            observations: RollingBuffer::filled(window_size, filler),
        }
    }

    /// Evict the oldest observation and append `observation`.
    pub fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Flatten to `[a0, b0, t0, a1, b1, t1, ...]`, oldest first.
    pub fn flatten(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.observations.len() * N_FEATURES);
        for observation in self.observations.iter() {
            flat.extend_from_slice(&observation.to_features());
        }
        flat
    }

    /// Observations, oldest to newest.
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn window_size(&self) -> usize {
        self.observations.capacity()
    }

    /// Most recently pushed observation.
    pub fn latest(&self) -> Option<&Observation> {
        self.observations.iter().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_buffer_grows_then_evicts() {
        let mut readings = RollingBuffer::new(2);
        assert!(readings.is_empty());

        readings.push(21.5f32);
        assert_eq!(readings.len(), 1);
        assert!(!readings.is_full());

        readings.push(22.0);
        readings.push(22.5);
        assert!(readings.is_full());
        assert_eq!(readings.len(), readings.capacity());
        assert_eq!(readings.to_vec(), vec![22.0, 22.5]);
    }

    #[test]
    fn test_rolling_buffer_filled() {
        let buffer = RollingBuffer::filled(4, 7u8);
        assert!(buffer.is_full());
        assert_eq!(buffer.to_vec(), vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_window_prefilled() {
        let window = FeatureWindow::new(4, Observation::new(20.0, 50.0, 0.5));
        assert_eq!(window.window_size(), 4);
        assert_eq!(
            window.flatten(),
            vec![20.0, 50.0, 0.5, 20.0, 50.0, 0.5, 20.0, 50.0, 0.5, 20.0, 50.0, 0.5]
        );
    }

    #[test]
    fn test_window_fifo_order() {
        let mut window = FeatureWindow::new(4, Observation::new(0.0, 0.0, 0.0));
        for i in 1..=6 {
            let v = i as f32;
            window.push(Observation::new(v, 10.0 * v, v / 10.0));
        }

        // Last four pushes (3..=6), oldest first, time-major then feature-minor.
        assert_eq!(
            window.flatten(),
            vec![
                3.0, 30.0, 0.3, 4.0, 40.0, 0.4, 5.0, 50.0, 0.5, 6.0, 60.0, 0.6
            ]
        );
        assert_eq!(window.observations().count(), 4);
        assert_eq!(window.latest(), Some(&Observation::new(6.0, 60.0, 0.6)));
    }
}
