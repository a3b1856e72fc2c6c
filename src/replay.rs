use std::collections::VecDeque;

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::grid::Position;

/// A single recorded transition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Position,
    pub action: Action,
    pub reward: f64,
    pub next_state: Position,
    pub done: bool,
    /// Global step number at which the transition happened.
    pub sequence: u64,
}

/// Bounded FIFO of past transitions with uniform sampling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayBuffer {
    capacity: usize,
    entries: VecDeque<Experience>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends, evicting the oldest entries until there is room.
    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(experience);
    }

    /// Draws `batch_size` entries uniformly: without replacement when the
    /// buffer holds enough, with replacement otherwise.
    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Vec<Experience> {
        let len = self.entries.len();
        if len == 0 || batch_size == 0 {
            return Vec::new();
        }
        if len >= batch_size {
            index::sample(rng, len, batch_size)
                .into_iter()
                .map(|idx| self.entries[idx])
                .collect()
        } else {
            (0..batch_size)
                .map(|_| self.entries[rng.gen_range(0..len)])
                .collect()
        }
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn experience(sequence: u64) -> Experience {
        Experience {
            state: Position::new(0, 0),
            action: Action::Right,
            reward: -1.0,
            next_state: Position::new(1, 0),
            done: false,
            sequence,
        }
    }

    #[test]
    fn evicts_oldest_entries_once_full() {
        let capacity = 5;
        let extra = 3;
        let mut buffer = ReplayBuffer::new(capacity);
        for seq in 0..(capacity + extra) as u64 {
            buffer.push(experience(seq));
            assert!(buffer.len() <= capacity);
        }
        assert_eq!(buffer.len(), capacity);
        let kept: Vec<u64> = buffer.iter().map(|e| e.sequence).collect();
        assert_eq!(kept, vec![3, 4, 5, 6, 7]);
        for evicted in 0..extra as u64 {
            assert!(buffer.iter().all(|e| e.sequence != evicted));
        }
    }

    #[test]
    fn push_trims_an_overfull_buffer() {
        let mut buffer = ReplayBuffer {
            capacity: 3,
            entries: (0..10).map(experience).collect(),
        };
        buffer.push(experience(10));
        assert_eq!(buffer.len(), 3);
        let kept: Vec<u64> = buffer.iter().map(|e| e.sequence).collect();
        assert_eq!(kept, vec![8, 9, 10]);
    }

    #[test]
    fn sample_without_replacement_when_full_enough() {
        let mut buffer = ReplayBuffer::new(16);
        for seq in 0..16 {
            buffer.push(experience(seq));
        }
        let mut rng = StdRng::seed_from_u64(9);
        let batch = buffer.sample(8, &mut rng);
        assert_eq!(batch.len(), 8);
        let mut seqs: Vec<u64> = batch.iter().map(|e| e.sequence).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 8);
    }

    #[test]
    fn sample_with_replacement_when_short() {
        let mut buffer = ReplayBuffer::new(16);
        buffer.push(experience(0));
        buffer.push(experience(1));
        let mut rng = StdRng::seed_from_u64(2);
        let batch = buffer.sample(6, &mut rng);
        assert_eq!(batch.len(), 6);
        assert!(batch.iter().all(|e| e.sequence < 2));
    }

    #[test]
    fn sample_from_empty_buffer_is_empty() {
        let buffer = ReplayBuffer::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(buffer.sample(4, &mut rng).is_empty());
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buffer = ReplayBuffer::new(3);
        buffer.push(experience(0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 3);
    }
}
