use std::collections::VecDeque;

use crate::scalar::Scalar;

/// Bounded FIFO of the most recent solution vectors, oldest first.
///
/// Once `depth` vectors are stored, each push evicts the oldest one and
/// reuses its allocation for the new entry.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<S> {
    depth: usize,
    slots: VecDeque<Vec<S>>,
}

impl<S: Scalar> HistoryBuffer<S> {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            slots: VecDeque::with_capacity(depth),
        }
    }

    /// Maximum number of stored vectors.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.depth
    }

    /// Appends a copy of `vector`, evicting the oldest entry when full.
    pub fn push(&mut self, vector: &[S]) {
        if self.depth == 0 {
            return;
        }
        let recycled = if self.is_full() {
            self.slots.pop_front()
        } else {
            None
        };
        let mut slot = recycled.unwrap_or_else(|| Vec::with_capacity(vector.len()));
        slot.clear();
        slot.extend_from_slice(vector);
        self.slots.push_back(slot);
    }

    /// Vector at position `index`, where 0 is the oldest.
    pub fn get(&self, index: usize) -> &[S] {
        &self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[S]> + '_ {
        self.slots.iter().map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_up_to_depth() {
        let mut history = HistoryBuffer::<f64>::new(3);
        assert!(history.is_empty());
        history.push(&[1.0]);
        history.push(&[2.0]);
        assert_eq!(history.len(), 2);
        assert!(!history.is_full());
        history.push(&[3.0]);
        assert!(history.is_full());
        assert_eq!(history.get(0), &[1.0]);
        assert_eq!(history.get(2), &[3.0]);
    }

    #[test]
    fn eviction_is_fifo() {
        let mut history = HistoryBuffer::<f64>::new(3);
        for v in 0..3 {
            history.push(&[v as f64, -(v as f64)]);
        }
        let before: Vec<Vec<f64>> = history.iter().map(<[f64]>::to_vec).collect();

        history.push(&[10.0, -10.0]);
        assert_eq!(history.len(), 3);
        for i in 0..2 {
            assert_eq!(history.get(i), before[i + 1].as_slice());
        }
        assert_eq!(history.get(2), &[10.0, -10.0]);
    }

    #[test]
    fn eviction_recycles_oldest_allocation() {
        let mut history = HistoryBuffer::<f64>::new(2);
        history.push(&[1.0, 1.0]);
        let oldest = history.get(0).as_ptr();
        history.push(&[2.0, 2.0]);
        history.push(&[3.0, 3.0]);
        assert_eq!(history.get(1).as_ptr(), oldest);
        assert_eq!(history.get(1), &[3.0, 3.0]);
    }

    #[test]
    fn zero_depth_stores_nothing() {
        let mut history = HistoryBuffer::<f64>::new(0);
        history.push(&[1.0]);
        assert!(history.is_empty());
    }
}
