use crate::metrics;
use lru::LruCache;
use parking_lot::Mutex;
use types::{Checkpoint, Epoch};

/// A justified checkpoint, its predecessor and a handful of fork
/// checkpoints are the only keys ever live at once.
const CACHE_SIZE: usize = 8;

/// Maps `(epoch, root)` checkpoints to the pre-state used to validate
/// attestations at that checkpoint.
///
/// Lookups for the same key return a clone of the identical state object
/// until the entry is evicted or pruned at finalization. The cache carries
/// its own lock; it is never touched while the proto-array locks are held.
pub struct CheckpointStateCache<S> {
    states: Mutex<LruCache<Checkpoint, S>>,
}

impl<S: Clone> Default for CheckpointStateCache<S> {
    fn default() -> Self {
        Self {
            states: Mutex::new(LruCache::new(CACHE_SIZE)),
        }
    }
}

impl<S: Clone> CheckpointStateCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup by `(epoch, root)`.
    pub fn state_by_checkpoint(&self, checkpoint: &Checkpoint) -> Option<S> {
        let state = self.states.lock().get(checkpoint).cloned();

        if state.is_some() {
            metrics::inc_counter(&metrics::CHECKPOINT_STATE_CACHE_HITS);
        } else {
            metrics::inc_counter(&metrics::CHECKPOINT_STATE_CACHE_MISSES);
        }

        state
    }

    pub fn insert(&self, checkpoint: Checkpoint, state: S) {
        self.states.lock().put(checkpoint, state);
    }

    /// Drop every entry below the finalized epoch: attestations targeting
    /// those checkpoints can no longer be accepted, so their pre-states are
    /// dead weight.
    pub fn prune(&self, finalized_epoch: Epoch) {
        let mut states = self.states.lock();

        let stale = states
            .iter()
            .filter(|(checkpoint, _)| checkpoint.epoch < finalized_epoch)
            .map(|(checkpoint, _)| *checkpoint)
            .collect::<Vec<_>>();

        for checkpoint in stale {
            states.pop(&checkpoint);
        }
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Hash256;

    fn checkpoint(epoch: u64, root: u64) -> Checkpoint {
        Checkpoint {
            epoch: Epoch::new(epoch),
            root: Hash256::from_low_u64_be(root),
        }
    }

    #[test]
    fn lookups_are_exact_match() {
        let cache = CheckpointStateCache::new();
        cache.insert(checkpoint(1, 1), "state-a");

        assert_eq!(cache.state_by_checkpoint(&checkpoint(1, 1)), Some("state-a"));
        // Same root, different epoch: a different key.
        assert_eq!(cache.state_by_checkpoint(&checkpoint(2, 1)), None);
        // Same epoch, different root: a different key.
        assert_eq!(cache.state_by_checkpoint(&checkpoint(1, 2)), None);
    }

    #[test]
    fn one_entry_per_checkpoint() {
        let cache = CheckpointStateCache::new();
        cache.insert(checkpoint(1, 1), "old");
        cache.insert(checkpoint(1, 1), "new");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.state_by_checkpoint(&checkpoint(1, 1)), Some("new"));
    }

    #[test]
    fn prune_drops_pre_finalized_epochs() {
        let cache = CheckpointStateCache::new();
        cache.insert(checkpoint(1, 1), "a");
        cache.insert(checkpoint(2, 2), "b");
        cache.insert(checkpoint(3, 3), "c");

        cache.prune(Epoch::new(3));

        assert_eq!(cache.state_by_checkpoint(&checkpoint(1, 1)), None);
        assert_eq!(cache.state_by_checkpoint(&checkpoint(2, 2)), None);
        assert_eq!(cache.state_by_checkpoint(&checkpoint(3, 3)), Some("c"));
    }
}
