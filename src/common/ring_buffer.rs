use std::collections::VecDeque;
use std::collections::vec_deque;
use std::iter::Copied;

/// Fixed-capacity FIFO of samples. Pushing into a full buffer evicts the oldest value.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a value, returning the evicted one if the buffer was already full.
    pub fn push(&mut self, val: f64) -> Option<f64> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(val);
        evicted
    }

    pub fn iter(&self) -> Copied<vec_deque::Iter<'_, f64>> {
        self.data.iter().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_full() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push(1.0), None);
        assert_eq!(buf.push(2.0), None);
        assert_eq!(buf.push(3.0), None);
        assert!(buf.is_full());

        assert_eq!(buf.push(4.0), Some(1.0));
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buf.last(), Some(4.0));
    }

    #[test]
    fn empty_buffer_has_no_last_value() {
        let buf = RingBuffer::new(2);
        assert!(buf.is_empty());
        assert_eq!(buf.last(), None);
        assert_eq!(buf.capacity(), 2);
    }
}
