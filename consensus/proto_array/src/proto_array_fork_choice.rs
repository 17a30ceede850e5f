use crate::cancellation::Cancellation;
use crate::error::Error;
use crate::proto_array::{ProtoArray, DEFAULT_PRUNE_THRESHOLD};
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use types::{Epoch, Hash256, Slot};

/// A validator's latest LMD target vote.
///
/// `current_root` is the root whose subtree currently carries the
/// validator's balance; `next_root`/`next_epoch` is the pending vote that
/// will be credited on the next weight recomputation. Zeroed roots mean the
/// validator has never voted.
#[derive(Clone, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct VoteTracker {
    pub current_root: Hash256,
    pub next_root: Hash256,
    pub next_epoch: Epoch,
}

/// A `Vec` wrapper which grows to match any request.
///
/// A `get_mut` beyond the end extends the list with `Default` entries to the
/// smallest size that can fulfil it. Growth is monotonic, mirroring the
/// validator registry.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T> ElasticList<T>
where
    T: Default,
{
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize_with(i + 1, Default::default);
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The proto-array store together with the vote cache and the balance
/// snapshot the last head computation ran against.
pub struct ProtoArrayForkChoice {
    proto_array: RwLock<ProtoArray>,
    votes: RwLock<ElasticList<VoteTracker>>,
    balances: RwLock<Vec<u64>>,
}

impl ProtoArrayForkChoice {
    /// Create a store anchored at the given finalized block.
    pub fn new(
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        finalized_root: Hash256,
    ) -> Result<Self, Error> {
        let mut proto_array = ProtoArray {
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            justified_epoch,
            finalized_epoch,
            finalized_root,
            nodes: Vec::with_capacity(1),
            indices: HashMap::with_capacity(1),
        };

        // The anchor is the only node whose parent is legitimately unknown.
        proto_array.insert(
            Slot::new(0),
            finalized_root,
            None,
            justified_epoch,
            finalized_epoch,
        )?;

        Ok(Self {
            proto_array: RwLock::new(proto_array),
            votes: RwLock::new(ElasticList::default()),
            balances: RwLock::new(vec![]),
        })
    }

    /// Record a target vote for each of the attesting validators.
    ///
    /// A vote is taken iff the slot is newly allocated or the target epoch is
    /// strictly higher than the pending one; an equal-epoch vote never
    /// overwrites, so duplicate and re-aggregated attestations are inert and
    /// processing order cannot change the outcome.
    pub fn process_attestation(
        &self,
        validator_indices: &[u64],
        block_root: Hash256,
        target_epoch: Epoch,
    ) {
        let mut votes = self.votes.write();

        for validator_index in validator_indices {
            let vote = votes.get_mut(*validator_index as usize);

            if *vote == VoteTracker::default() || target_epoch > vote.next_epoch {
                vote.next_root = block_root;
                vote.next_epoch = target_epoch;
            }
        }
    }

    /// Insert a block into the store.
    pub fn process_block(
        &self,
        slot: Slot,
        block_root: Hash256,
        parent_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        self.proto_array.write().insert(
            slot,
            block_root,
            Some(parent_root),
            justified_epoch,
            finalized_epoch,
        )
    }

    /// Recompute and return the canonical head.
    ///
    /// Turns pending votes and the balance change since the last call into
    /// per-node deltas, applies them, then walks the best-descendant link
    /// from the justified root. The vote cache and balance snapshot are only
    /// swapped in once weight application has succeeded, so a failure or a
    /// cancellation observed beforehand leaves every piece of state as it
    /// was.
    pub fn head(
        &self,
        finalized_epoch: Epoch,
        justified_root: Hash256,
        justified_state_balances: &[u64],
        justified_epoch: Epoch,
        cancellation: &Cancellation,
    ) -> Result<Hash256, Error> {
        let mut proto_array = self.proto_array.write();
        let mut votes = self.votes.write();
        let mut balances = self.balances.write();

        let new_balances = justified_state_balances;

        let (deltas, new_votes) =
            compute_deltas(&proto_array.indices, &votes, &balances, new_balances)?;

        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        proto_array.apply_weight_changes(justified_epoch, finalized_epoch, deltas)?;

        *votes = new_votes;
        *balances = new_balances.to_vec();

        proto_array.head(&justified_root)
    }

    /// Prune the store upon finalization. See `ProtoArray::maybe_prune`.
    pub fn maybe_prune(
        &self,
        finalized_root: Hash256,
        cancellation: &Cancellation,
    ) -> Result<(), Error> {
        self.proto_array
            .write()
            .maybe_prune(finalized_root, cancellation)
    }

    pub fn justified_epoch(&self) -> Epoch {
        self.proto_array.read().justified_epoch
    }

    pub fn finalized_epoch(&self) -> Epoch {
        self.proto_array.read().finalized_epoch
    }

    pub fn set_prune_threshold(&self, prune_threshold: usize) {
        self.proto_array.write().prune_threshold = prune_threshold;
    }

    pub fn len(&self) -> usize {
        self.proto_array.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.read().indices.contains_key(block_root)
    }

    pub fn block_slot(&self, block_root: &Hash256) -> Option<Slot> {
        let proto_array = self.proto_array.read();

        let index = *proto_array.indices.get(block_root)?;
        Some(proto_array.nodes.get(index)?.slot)
    }

    /// The latest vote recorded for the validator, if any.
    pub fn latest_message(&self, validator_index: u64) -> Option<(Hash256, Epoch)> {
        let votes = self.votes.read();

        let vote = votes.0.get(validator_index as usize)?;
        if *vote == VoteTracker::default() {
            None
        } else {
            Some((vote.next_root, vote.next_epoch))
        }
    }
}

/// Turn vote transitions and balance changes into one signed delta per node.
///
/// Returns the deltas together with the promoted vote list
/// (`current_root <- next_root`); the caller installs the new votes only
/// after the deltas have been applied successfully.
///
/// A vote for a root that is not in `indices` is skipped without error: the
/// block was pruned at finalization and its weight is no longer interesting.
/// A validator missing from either balance list contributes zero on that
/// side, covering both not-yet-activated validators and a justified state
/// from a fork that on-boarded fewer of them.
fn compute_deltas(
    indices: &HashMap<Hash256, usize>,
    votes: &ElasticList<VoteTracker>,
    old_balances: &[u64],
    new_balances: &[u64],
) -> Result<(Vec<i64>, ElasticList<VoteTracker>), Error> {
    let mut deltas = vec![0_i64; indices.len()];
    let mut new_votes = votes.clone();

    for (validator_index, vote) in new_votes.iter_mut().enumerate() {
        // The validator has never voted: nothing to move.
        if vote.current_root == Hash256::zero() && vote.next_root == Hash256::zero() {
            continue;
        }

        let old_balance = old_balances.get(validator_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(validator_index).copied().unwrap_or(0);

        if vote.current_root != vote.next_root || old_balance != new_balance {
            if let Some(current_delta_index) = indices.get(&vote.current_root).copied() {
                let delta = deltas
                    .get(current_delta_index)
                    .ok_or(Error::InvalidNodeDelta(current_delta_index))?
                    .checked_sub(old_balance as i64)
                    .ok_or(Error::DeltaOverflow(current_delta_index))?;

                // Access is safe, checked above.
                deltas[current_delta_index] = delta;
            }

            if let Some(next_delta_index) = indices.get(&vote.next_root).copied() {
                let delta = deltas
                    .get(next_delta_index)
                    .ok_or(Error::InvalidNodeDelta(next_delta_index))?
                    .checked_add(new_balance as i64)
                    .ok_or(Error::DeltaOverflow(next_delta_index))?;

                deltas[next_delta_index] = delta;
            }

            vote.current_root = vote.next_root;
        }
    }

    Ok((deltas, new_votes))
}

#[cfg(test)]
mod test_compute_deltas {
    use super::*;

    /// Gives a hash that is not the zero hash (unless i is `u64::MAX`).
    fn hash_from_index(i: usize) -> Hash256 {
        Hash256::from_low_u64_be(i as u64 + 1)
    }

    fn assert_votes_promoted(votes: &ElasticList<VoteTracker>) {
        for vote in &votes.0 {
            assert_eq!(
                vote.current_root, vote.next_root,
                "every vote should have been promoted"
            );
        }
    }

    #[test]
    fn zero_hash() {
        let validator_count = 16;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();
        let mut old_balances = vec![];
        let mut new_balances = vec![];

        for i in 0..validator_count {
            indices.insert(hash_from_index(i), i);
            votes.0.push(VoteTracker::default());
            old_balances.push(0);
            new_balances.push(0);
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &old_balances, &new_balances)
            .expect("should compute deltas");

        assert_eq!(deltas, vec![0; validator_count], "no deltas should be produced");
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn all_voted_the_same() {
        const BALANCE: u64 = 42;

        let validator_count = 16;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();
        let mut balances = vec![];

        for i in 0..validator_count {
            indices.insert(hash_from_index(i), i);
            votes.0.push(VoteTracker {
                current_root: Hash256::zero(),
                next_root: hash_from_index(0),
                next_epoch: Epoch::new(0),
            });
            balances.push(BALANCE);
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &balances, &balances)
            .expect("should compute deltas");

        for (i, delta) in deltas.into_iter().enumerate() {
            if i == 0 {
                assert_eq!(
                    delta,
                    BALANCE as i64 * validator_count as i64,
                    "the voted-for root should collect all balances"
                );
            } else {
                assert_eq!(delta, 0, "all other deltas should be zero");
            }
        }
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn different_votes() {
        const BALANCE: u64 = 42;

        let validator_count = 16;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();
        let mut balances = vec![];

        for i in 0..validator_count {
            indices.insert(hash_from_index(i), i);
            votes.0.push(VoteTracker {
                current_root: Hash256::zero(),
                next_root: hash_from_index(i),
                next_epoch: Epoch::new(0),
            });
            balances.push(BALANCE);
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &balances, &balances)
            .expect("should compute deltas");

        for delta in deltas {
            assert_eq!(delta, BALANCE as i64, "each root should get one balance");
        }
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn moving_votes() {
        const BALANCE: u64 = 42;

        let validator_count = 16;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();
        let mut balances = vec![];

        for i in 0..validator_count {
            indices.insert(hash_from_index(i), i);
            votes.0.push(VoteTracker {
                current_root: hash_from_index(0),
                next_root: hash_from_index(1),
                next_epoch: Epoch::new(0),
            });
            balances.push(BALANCE);
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &balances, &balances)
            .expect("should compute deltas");

        let total_delta = BALANCE as i64 * validator_count as i64;

        for (i, delta) in deltas.into_iter().enumerate() {
            if i == 0 {
                assert_eq!(delta, -total_delta, "the deserted root loses everything");
            } else if i == 1 {
                assert_eq!(delta, total_delta, "the new root gains everything");
            } else {
                assert_eq!(delta, 0, "all other deltas should be zero");
            }
        }
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn move_out_of_tree() {
        const BALANCE: u64 = 42;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();

        // There is only one block.
        indices.insert(hash_from_index(1), 0);

        let balances = vec![BALANCE; 2];

        // One validator moves their vote from the block to the zero hash,
        // the other to something outside the tree.
        votes.0.push(VoteTracker {
            current_root: hash_from_index(1),
            next_root: Hash256::zero(),
            next_epoch: Epoch::new(0),
        });
        votes.0.push(VoteTracker {
            current_root: hash_from_index(1),
            next_root: Hash256::from_low_u64_be(1337),
            next_epoch: Epoch::new(0),
        });

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &balances, &balances)
            .expect("should compute deltas");

        assert_eq!(deltas.len(), 1);
        assert_eq!(
            deltas[0],
            -(BALANCE as i64) * 2,
            "the block should lose both balances"
        );
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn changing_balances() {
        const OLD_BALANCE: u64 = 42;
        const NEW_BALANCE: u64 = OLD_BALANCE * 2;

        let validator_count = 16;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();
        let mut old_balances = vec![];
        let mut new_balances = vec![];

        for i in 0..validator_count {
            indices.insert(hash_from_index(i), i);
            votes.0.push(VoteTracker {
                current_root: hash_from_index(0),
                next_root: hash_from_index(1),
                next_epoch: Epoch::new(0),
            });
            old_balances.push(OLD_BALANCE);
            new_balances.push(NEW_BALANCE);
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &old_balances, &new_balances)
            .expect("should compute deltas");

        for (i, delta) in deltas.into_iter().enumerate() {
            if i == 0 {
                assert_eq!(
                    delta,
                    -(OLD_BALANCE as i64) * validator_count as i64,
                    "the deserted root loses the old balances"
                );
            } else if i == 1 {
                assert_eq!(
                    delta,
                    NEW_BALANCE as i64 * validator_count as i64,
                    "the new root gains the new balances"
                );
            } else {
                assert_eq!(delta, 0, "all other deltas should be zero");
            }
        }
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn validator_appears() {
        const BALANCE: u64 = 42;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();

        indices.insert(hash_from_index(1), 0);
        indices.insert(hash_from_index(2), 1);

        // One validator in the old balances, two in the new.
        let old_balances = vec![BALANCE; 1];
        let new_balances = vec![BALANCE; 2];

        for _ in 0..2 {
            votes.0.push(VoteTracker {
                current_root: hash_from_index(1),
                next_root: hash_from_index(2),
                next_epoch: Epoch::new(0),
            });
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &old_balances, &new_balances)
            .expect("should compute deltas");

        assert_eq!(
            deltas[0],
            -(BALANCE as i64),
            "block 1 only loses the balance that previously existed"
        );
        assert_eq!(
            deltas[1],
            2 * BALANCE as i64,
            "block 2 gains both balances"
        );
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn validator_disappears() {
        const BALANCE: u64 = 42;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();

        indices.insert(hash_from_index(1), 0);
        indices.insert(hash_from_index(2), 1);

        // Two validators in the old balances, one in the new.
        let old_balances = vec![BALANCE; 2];
        let new_balances = vec![BALANCE; 1];

        for _ in 0..2 {
            votes.0.push(VoteTracker {
                current_root: hash_from_index(1),
                next_root: hash_from_index(2),
                next_epoch: Epoch::new(0),
            });
        }

        let (deltas, new_votes) = compute_deltas(&indices, &votes, &old_balances, &new_balances)
            .expect("should compute deltas");

        assert_eq!(
            deltas[0],
            -(BALANCE as i64) * 2,
            "block 1 loses both balances"
        );
        assert_eq!(
            deltas[1],
            BALANCE as i64,
            "block 2 only gains the balance that still exists"
        );
        assert_votes_promoted(&new_votes);
    }

    #[test]
    fn input_votes_are_untouched() {
        const BALANCE: u64 = 42;

        let mut indices = HashMap::new();
        let mut votes = ElasticList::default();

        indices.insert(hash_from_index(0), 0);
        indices.insert(hash_from_index(1), 1);

        votes.0.push(VoteTracker {
            current_root: hash_from_index(0),
            next_root: hash_from_index(1),
            next_epoch: Epoch::new(1),
        });

        let balances = vec![BALANCE; 1];
        let before = votes.clone();

        let (_deltas, new_votes) = compute_deltas(&indices, &votes, &balances, &balances)
            .expect("should compute deltas");

        // Promotion happens on the returned list; the input is the fallback
        // if weight application fails.
        assert_eq!(votes, before);
        assert_eq!(new_votes.0[0].current_root, hash_from_index(1));
    }
}

#[cfg(test)]
mod test_vote_cache {
    use super::*;

    fn fork_choice() -> ProtoArrayForkChoice {
        ProtoArrayForkChoice::new(Epoch::new(0), Epoch::new(0), Hash256::zero())
            .expect("fork choice should instantiate")
    }

    #[test]
    fn newly_allocated_votes_are_recorded() {
        let fc = fork_choice();
        let root = Hash256::from_low_u64_be(1);

        fc.process_attestation(&[0, 3], root, Epoch::new(1));

        assert_eq!(fc.latest_message(0), Some((root, Epoch::new(1))));
        assert_eq!(fc.latest_message(1), None, "untouched slots stay zeroed");
        assert_eq!(fc.latest_message(3), Some((root, Epoch::new(1))));
    }

    #[test]
    fn lower_or_equal_epoch_votes_are_ignored() {
        let fc = fork_choice();
        let first = Hash256::from_low_u64_be(1);
        let second = Hash256::from_low_u64_be(2);

        fc.process_attestation(&[0], first, Epoch::new(2));
        // Equal epoch: ignored, keeping duplicate aggregates deterministic.
        fc.process_attestation(&[0], second, Epoch::new(2));
        assert_eq!(fc.latest_message(0), Some((first, Epoch::new(2))));

        // Lower epoch: ignored.
        fc.process_attestation(&[0], second, Epoch::new(1));
        assert_eq!(fc.latest_message(0), Some((first, Epoch::new(2))));

        // Higher epoch: taken.
        fc.process_attestation(&[0], second, Epoch::new(3));
        assert_eq!(fc.latest_message(0), Some((second, Epoch::new(3))));
    }
}
