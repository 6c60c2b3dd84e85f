//! Fixed-capacity FIFO windows used for smoothing.

use std::collections::VecDeque;

use crate::geo::{mean_coordinate, Coordinate};

/// A bounded FIFO buffer; pushing onto a full window evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> SlidingWindow<T> {
    /// Create an empty window. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, returning the evicted entry if the window was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }
}

impl SlidingWindow<f64> {
    pub fn mean(&self) -> Option<f64> {
        self.mean_by(|v| v)
    }

    /// Mean of absolute values.
    pub fn mean_abs(&self) -> Option<f64> {
        self.mean_by(f64::abs)
    }

    fn mean_by(&self, f: impl Fn(f64) -> f64) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        let sum: f64 = self.items.iter().map(|v| f(*v)).sum();
        Some(sum / self.items.len() as f64)
    }
}

impl SlidingWindow<Coordinate> {
    pub fn mean_position(&self) -> Option<Coordinate> {
        mean_coordinate(self.items.iter())
    }
}
