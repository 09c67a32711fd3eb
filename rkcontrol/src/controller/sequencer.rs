//! Choice of the next item: sequential, shuffled, or shuffled across the
//! whole library.

use std::collections::VecDeque;

use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Sequential,
    Shuffle,
    /// Shuffle over every item of every playlist except the trigger one.
    MasterShuffle,
}

/// A permutation consumed front to back.
///
/// The permutation is regenerated when it runs out, when the identity of
/// what it shuffles changes, or when its size changes.
#[derive(Debug, Clone)]
pub struct ShuffleQueue<T = usize> {
    pending: VecDeque<T>,
    identity: Option<String>,
    size: usize,
}

/// Queue over `(playlist, item)` pairs.
pub type MasterShuffleQueue = ShuffleQueue<(usize, usize)>;

impl<T> Default for ShuffleQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            identity: None,
            size: 0,
        }
    }
}

impl<T> ShuffleQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a fresh permutation on the next take.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.identity = None;
        self.size = 0;
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Next element for the collection named `identity` holding `size`
    /// elements. `pool` is only called when a new permutation is needed.
    pub fn take_with<R, F>(&mut self, identity: &str, size: usize, rng: &mut R, pool: F) -> Option<T>
    where
        R: Rng + ?Sized,
        F: FnOnce() -> Vec<T>,
    {
        if size == 0 {
            self.reset();
            return None;
        }
        let stale = self.identity.as_deref() != Some(identity) || self.size != size;
        if stale || self.pending.is_empty() {
            let mut order = pool();
            order.shuffle(rng);
            self.pending = order.into();
            self.identity = Some(identity.to_string());
            self.size = size;
        }
        self.pending.pop_front()
    }
}

impl ShuffleQueue<usize> {
    /// Next index of a playlist of `size` items.
    pub fn take<R: Rng + ?Sized>(&mut self, identity: &str, size: usize, rng: &mut R) -> Option<usize> {
        self.take_with(identity, size, rng, || (0..size).collect())
    }
}

/// Bounded record of what was played, newest last.
#[derive(Debug, Clone)]
pub struct PlayHistory {
    entries: VecDeque<(usize, usize)>,
    capacity: usize,
}

impl PlayHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn push(&mut self, entry: (usize, usize)) {
        if self.entries.back() == Some(&entry) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Forgets the current entry and returns the one played before it,
    /// which becomes current.
    pub fn step_back(&mut self) -> Option<(usize, usize)> {
        if self.entries.len() < 2 {
            return self.entries.back().copied();
        }
        self.entries.pop_back();
        self.entries.back().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_shuffle_visits_every_index_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = ShuffleQueue::new();
        let seen: HashSet<usize> = (0..10)
            .map(|_| queue.take("a", 10, &mut rng).unwrap())
            .collect();
        assert_eq!(seen.len(), 10);
        assert_eq!(queue.remaining(), 0);

        // La permutation suivante est générée à la demande
        assert!(queue.take("a", 10, &mut rng).unwrap() < 10);
        assert_eq!(queue.remaining(), 9);
    }

    #[test]
    fn test_shuffle_regenerates_on_identity_or_size_change() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = ShuffleQueue::new();
        queue.take("a", 5, &mut rng);
        assert_eq!(queue.remaining(), 4);

        queue.take("b", 5, &mut rng);
        assert_eq!(queue.remaining(), 4);

        queue.take("b", 3, &mut rng);
        assert_eq!(queue.remaining(), 2);

        assert_eq!(queue.take("b", 0, &mut rng), None);
    }

    #[test]
    fn test_master_queue_uses_pairs() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut queue = MasterShuffleQueue::new();
        let pairs = vec![(0, 0), (0, 1), (2, 0)];
        let seen: HashSet<(usize, usize)> = (0..3)
            .map(|_| {
                queue
                    .take_with("library", pairs.len(), &mut rng, || pairs.clone())
                    .unwrap()
            })
            .collect();
        assert_eq!(seen, pairs.into_iter().collect());
    }

    #[test]
    fn test_history_steps_back_and_is_bounded() {
        let mut history = PlayHistory::new(3);
        history.push((0, 1));
        history.push((0, 1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.step_back(), Some((0, 1)));

        history.push((0, 2));
        history.push((0, 3));
        history.push((0, 4));
        assert_eq!(history.len(), 3);
        assert_eq!(history.step_back(), Some((0, 3)));
        assert_eq!(history.step_back(), Some((0, 2)));
        assert_eq!(history.step_back(), Some((0, 2)));
    }
}
