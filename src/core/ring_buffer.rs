//! Ring buffer for bounded rolling sequences
//!
//! Stores at most `capacity` elements. Pushing onto a full buffer evicts the
//! oldest element first (FIFO). Used for the log buffer and metric series.

use std::collections::VecDeque;

/// Ring buffer with fixed capacity
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create new ring buffer
    ///
    /// A capacity of zero is bumped to one so a push is always observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add value to buffer, returning the evicted value if the buffer was full
    #[inline]
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.buffer.len() == self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(value);
        evicted
    }

    /// Values in insertion order (oldest first)
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buffer.iter()
    }

    /// Most recently pushed value
    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.buffer.back()
    }

    /// Get stored count
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.buffer.iter().cloned().collect()
    }

    /// Copy of the contents, newest first
    pub fn to_vec_rev(&self) -> Vec<T> {
        self.buffer.iter().rev().cloned().collect()
    }
}
