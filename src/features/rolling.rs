//! Bounded rolling windows over per-match values

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Fixed-capacity window holding the most recent values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        RollingWindow {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Push a value, evicting the oldest once full
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Mean of the retained values, None when empty
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Mean of the last `min(window, n)` values of a chronological series
pub fn rolling_average(values: &[f64], window: usize) -> Option<f64> {
    if values.is_empty() || window == 0 {
        return None;
    }
    let tail = &values[values.len().saturating_sub(window)..];
    Some(tail.iter().sum::<f64>() / tail.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average() {
        assert_eq!(rolling_average(&[2.0, 1.0, 0.0], 5), Some(1.0));
        assert_eq!(rolling_average(&[9.0, 2.0, 1.0, 0.0], 3), Some(1.0));
        assert_eq!(rolling_average(&[], 5), None);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        assert_eq!(window.mean(), None);

        for v in [10.0, 2.0, 1.0, 0.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), Some(1.0));
    }

    #[test]
    fn test_window_matches_slice_average() {
        let series = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0];
        let mut window = RollingWindow::new(5);
        for (i, v) in series.iter().enumerate() {
            window.push(*v);
            assert_eq!(window.mean(), rolling_average(&series[..=i], 5));
        }
    }
}
