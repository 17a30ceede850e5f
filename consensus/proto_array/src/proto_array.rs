use crate::cancellation::Cancellation;
use crate::error::Error;
use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use types::{Epoch, Hash256, Slot};

/// Do not attempt to prune the tree unless it has at least this many nodes.
/// Small prunes simply waste time.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 256;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProtoNode {
    /// The `slot` is not used by the array itself, it exists so upstream
    /// components (attestation verification, block queries) can read it
    /// without a database round-trip.
    pub slot: Slot,
    pub root: Hash256,
    pub parent: Option<usize>,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    weight: u64,
    best_child: Option<usize>,
    best_descendant: Option<usize>,
}

impl ProtoNode {
    /// Sum of effective balances voting for this node or one of its
    /// descendants.
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProtoArray {
    pub prune_threshold: usize,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub finalized_root: Hash256,
    pub nodes: Vec<ProtoNode>,
    pub indices: HashMap<Hash256, usize>,
}

impl ProtoArray {
    /// Register a block with the store.
    ///
    /// Inserting a known root is a no-op, so replayed or gossip-duplicated
    /// blocks are harmless. It is only sane to supply a `None` parent for the
    /// anchor block.
    pub fn insert(
        &mut self,
        slot: Slot,
        root: Hash256,
        parent_root: Option<Hash256>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if self.indices.contains_key(&root) {
            return Ok(());
        }

        let node_index = self.nodes.len();
        // An unknown parent root is tolerated: it only legitimately happens
        // for the anchor, whose parent predates the finalized checkpoint.
        let parent = parent_root.and_then(|parent| self.indices.get(&parent).copied());

        self.indices.insert(root, node_index);
        self.nodes.push(ProtoNode {
            slot,
            root,
            parent,
            justified_epoch,
            finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        if let Some(parent_index) = parent {
            self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
        }

        Ok(())
    }

    /// Apply one delta per node, iterating the array backwards so that every
    /// child is touched before its parent.
    ///
    /// For each node the delta is added to its weight, back-propagated into
    /// the parent's delta, and the parent's best-child/best-descendant links
    /// are re-evaluated with this node as a candidate. Descending order makes
    /// this single pass sound: by the time a parent compares two children,
    /// both already carry their final weights.
    ///
    /// The store's justified/finalized epochs are moved to the supplied
    /// values, which re-anchors the viability filter for this run.
    pub fn apply_weight_changes(
        &mut self,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        mut deltas: Vec<i64>,
    ) -> Result<(), Error> {
        if deltas.len() != self.nodes.len() {
            return Err(Error::InvalidDeltaLen {
                deltas: deltas.len(),
                nodes: self.nodes.len(),
            });
        }

        if justified_epoch != self.justified_epoch || finalized_epoch != self.finalized_epoch {
            self.justified_epoch = justified_epoch;
            self.finalized_epoch = finalized_epoch;
        }

        for node_index in (0..self.nodes.len()).rev() {
            let node = self
                .nodes
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?;

            // The zero hash aliases the genesis block; it is always chosen
            // when it is the only candidate and can never have a parent, so
            // its weight is irrelevant.
            if node.root == Hash256::zero() {
                continue;
            }

            let node_delta = deltas
                .get(node_index)
                .copied()
                .ok_or(Error::InvalidNodeDelta(node_index))?;

            if node_delta < 0 {
                node.weight = node
                    .weight
                    .checked_sub(node_delta.unsigned_abs())
                    .ok_or(Error::NegativeWeight(node_index))?;
            } else {
                node.weight = node
                    .weight
                    .checked_add(node_delta as u64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }

            if let Some(parent_index) = node.parent {
                let parent_delta = deltas
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidParentDelta(parent_index))?;
                *parent_delta += node_delta;

                self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
            }
        }

        Ok(())
    }

    /// Follow the best-descendant link from the justified root to the head
    /// block.
    ///
    /// The result is only accurate if `apply_weight_changes` has run since
    /// the last `insert`: inserting does not walk the tree to refresh
    /// ancestor links.
    pub fn head(&self, justified_root: &Hash256) -> Result<Hash256, Error> {
        let justified_index = self
            .indices
            .get(justified_root)
            .copied()
            .ok_or(Error::JustifiedNodeUnknown(*justified_root))?;

        let justified_node = self
            .nodes
            .get(justified_index)
            .ok_or(Error::InvalidNodeIndex(justified_index))?;

        let best_descendant_index = justified_node.best_descendant.unwrap_or(justified_index);

        let best_node = self
            .nodes
            .get(best_descendant_index)
            .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;

        // A non-viable best node means the link structure is stale or the
        // store is corrupt. The caller must rebuild from finalization.
        if !self.node_is_viable_for_head(best_node) {
            return Err(Error::InvalidBestNode {
                start_root: *justified_root,
                justified_epoch: self.justified_epoch,
                finalized_epoch: self.finalized_epoch,
                head_root: best_node.root,
                head_justified_epoch: best_node.justified_epoch,
                head_finalized_epoch: best_node.finalized_epoch,
            });
        }

        Ok(best_node.root)
    }

    /// Re-root the store at the newly finalized block, dropping every node
    /// that is not one of its descendants.
    ///
    /// No-ops when the root is already the finalized root (a repeated
    /// finalization notice) or while the tree is below the prune threshold.
    /// The surviving subtree is discovered breadth-first and rewritten in
    /// discovery order, which keeps every parent ahead of its children;
    /// parent/best-child/best-descendant links are translated through an
    /// index remap and the root lookup map is rebuilt to match.
    ///
    /// All rewriting happens in buffers that are only committed at the end,
    /// so a cancellation observed mid-walk leaves the store untouched.
    pub fn maybe_prune(
        &mut self,
        finalized_root: Hash256,
        cancellation: &Cancellation,
    ) -> Result<(), Error> {
        if finalized_root == self.finalized_root {
            return Ok(());
        }
        if self.nodes.len() <= self.prune_threshold {
            return Ok(());
        }

        let finalized_index = *self
            .indices
            .get(&finalized_root)
            .ok_or(Error::FinalizedNodeUnknown(finalized_root))?;

        // Child adjacency, derived from the parent pointers in one scan.
        let mut children = vec![Vec::new(); self.nodes.len()];
        for (node_index, node) in self.nodes.iter().enumerate() {
            if let Some(parent_index) = node.parent {
                children
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidNodeIndex(parent_index))?
                    .push(node_index);
            }
        }

        // Walk the finalized subtree. `kept` lists old indices in their new
        // order; `remap` translates old indices to new ones.
        let mut remap = vec![None; self.nodes.len()];
        let mut kept = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(finalized_index);

        while let Some(old_index) = queue.pop_front() {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }

            remap[old_index] = Some(kept.len());
            kept.push(old_index);

            let node_children = children
                .get(old_index)
                .ok_or(Error::InvalidNodeIndex(old_index))?;
            queue.extend(node_children.iter().copied());
        }

        let mut new_nodes = Vec::with_capacity(kept.len());
        let mut new_indices = HashMap::with_capacity(kept.len());

        for &old_index in &kept {
            let mut node = self
                .nodes
                .get(old_index)
                .cloned()
                .ok_or(Error::InvalidNodeIndex(old_index))?;

            // The new anchor's parent predates finalization and is dropped.
            node.parent = node
                .parent
                .and_then(|parent| remap.get(parent).copied().flatten());

            // Best links always land inside the subtree; a miss here means
            // the link structure was already corrupt.
            if let Some(best_child) = node.best_child {
                node.best_child = Some(
                    remap
                        .get(best_child)
                        .copied()
                        .flatten()
                        .ok_or(Error::IndexOverflow("best_child"))?,
                );
            }
            if let Some(best_descendant) = node.best_descendant {
                node.best_descendant = Some(
                    remap
                        .get(best_descendant)
                        .copied()
                        .flatten()
                        .ok_or(Error::IndexOverflow("best_descendant"))?,
                );
            }

            new_indices.insert(node.root, new_nodes.len());
            new_nodes.push(node);
        }

        self.nodes = new_nodes;
        self.indices = new_indices;
        self.finalized_root = finalized_root;

        Ok(())
    }

    /// Observe the child at `child_index` and potentially adopt it as the
    /// parent's best child.
    ///
    /// Four outcomes are possible:
    ///
    /// - The child is the reigning best child but has stopped leading to a
    ///   viable head (an FFG change), so the parent's links are cleared.
    /// - The child is the reigning best child and is re-affirmed, refreshing
    ///   the parent's best-descendant.
    /// - The child displaces the reigning best child.
    /// - Nothing changes.
    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
    ) -> Result<(), Error> {
        let child = self
            .nodes
            .get(child_index)
            .ok_or(Error::InvalidNodeIndex(child_index))?;
        let parent = self
            .nodes
            .get(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;

        let child_leads_to_viable_head = self.node_leads_to_viable_head(child)?;

        // The three assignments we may make to the parent's
        // (best_child, best_descendant) pair.
        let no_change = (parent.best_child, parent.best_descendant);
        let child_becomes_best = (
            Some(child_index),
            child.best_descendant.or(Some(child_index)),
        );
        let no_viable_child = (None, None);

        let (new_best_child, new_best_descendant) = match parent.best_child {
            Some(best_child_index) if best_child_index == child_index => {
                if child_leads_to_viable_head {
                    // Re-affirm the reigning child so the parent picks up any
                    // change to its best-descendant.
                    child_becomes_best
                } else {
                    no_viable_child
                }
            }
            Some(best_child_index) => {
                let best_child = self
                    .nodes
                    .get(best_child_index)
                    .ok_or(Error::InvalidBestDescendant(best_child_index))?;
                let best_child_leads_to_viable_head =
                    self.node_leads_to_viable_head(best_child)?;

                if child_leads_to_viable_head && !best_child_leads_to_viable_head {
                    child_becomes_best
                } else if !child_leads_to_viable_head && best_child_leads_to_viable_head {
                    no_change
                } else {
                    match child.weight.cmp(&best_child.weight) {
                        Ordering::Greater => child_becomes_best,
                        Ordering::Less => no_change,
                        // Equal weights resolve to the larger root. `Hash256`
                        // orders lexicographically over bytes, which for
                        // unsigned bytes is exactly the protocol's
                        // big-endian-integer comparison.
                        Ordering::Equal => {
                            if child.root >= best_child.root {
                                child_becomes_best
                            } else {
                                no_change
                            }
                        }
                    }
                }
            }
            None if child_leads_to_viable_head => child_becomes_best,
            None => no_change,
        };

        let parent = self
            .nodes
            .get_mut(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;
        parent.best_child = new_best_child;
        parent.best_descendant = new_best_descendant;

        Ok(())
    }

    /// Whether the node itself, or the best descendant it points at, is
    /// viable for the head.
    fn node_leads_to_viable_head(&self, node: &ProtoNode) -> Result<bool, Error> {
        let best_descendant_is_viable = if let Some(best_descendant_index) = node.best_descendant {
            let best_descendant = self
                .nodes
                .get(best_descendant_index)
                .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;
            self.node_is_viable_for_head(best_descendant)
        } else {
            false
        };

        Ok(best_descendant_is_viable || self.node_is_viable_for_head(node))
    }

    /// The `filter_block_tree` check from the consensus spec: a node whose
    /// justified or finalized epoch disagrees with the store is not a head
    /// candidate. Epoch zero on the store side means no checkpoint has been
    /// reached yet, which waives the corresponding check.
    fn node_is_viable_for_head(&self, node: &ProtoNode) -> bool {
        (node.justified_epoch == self.justified_epoch || self.justified_epoch == Epoch::new(0))
            && (node.finalized_epoch == self.finalized_epoch
                || self.finalized_epoch == Epoch::new(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i)
    }

    fn new_array(finalized_root: Hash256) -> ProtoArray {
        let mut array = ProtoArray {
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
            finalized_root,
            nodes: vec![],
            indices: HashMap::new(),
        };
        array
            .insert(
                Slot::new(0),
                finalized_root,
                None,
                Epoch::new(0),
                Epoch::new(0),
            )
            .expect("anchor insert succeeds");
        array
    }

    /// Build a linear chain on top of the anchor; root(i) at slot i.
    fn extend_chain(array: &mut ProtoArray, from: u64, to: u64) {
        for i in from..=to {
            array
                .insert(
                    Slot::new(i),
                    root(i),
                    Some(root(i - 1)),
                    Epoch::new(0),
                    Epoch::new(0),
                )
                .expect("insert succeeds");
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut array = new_array(root(0));
        extend_chain(&mut array, 1, 2);

        let before = array.clone();
        array
            .insert(
                Slot::new(1),
                root(1),
                Some(root(0)),
                Epoch::new(0),
                Epoch::new(0),
            )
            .expect("duplicate insert succeeds");

        assert_eq!(array, before);
    }

    #[test]
    fn delta_length_mismatch_is_rejected() {
        let mut array = new_array(root(0));
        extend_chain(&mut array, 1, 2);

        assert_eq!(
            array.apply_weight_changes(Epoch::new(0), Epoch::new(0), vec![0; 2]),
            Err(Error::InvalidDeltaLen { deltas: 2, nodes: 3 })
        );
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut array = new_array(root(0));
        extend_chain(&mut array, 1, 1);

        // Node 1 has zero weight; subtracting from it must fail rather than
        // wrap.
        assert_eq!(
            array.apply_weight_changes(Epoch::new(0), Epoch::new(0), vec![0, -1]),
            Err(Error::NegativeWeight(1))
        );
    }

    #[test]
    fn prune_drops_non_descendants_and_reindexes() {
        let mut array = new_array(root(0));
        array.prune_threshold = 1;

        // A 300-block chain with a short abandoned fork off node 10.
        extend_chain(&mut array, 1, 300);
        for (i, fork_root) in [10_000, 10_001].iter().enumerate() {
            array
                .insert(
                    Slot::new(11 + i as u64),
                    root(*fork_root),
                    Some(if i == 0 { root(10) } else { root(10_000) }),
                    Epoch::new(0),
                    Epoch::new(0),
                )
                .expect("fork insert succeeds");
        }

        // Weight the canonical tip so the fork cannot win, then refresh the
        // best-descendant links bottom-up.
        let mut deltas = vec![0_i64; array.nodes.len()];
        deltas[300] = 100;
        array
            .apply_weight_changes(Epoch::new(0), Epoch::new(0), deltas)
            .expect("weight application succeeds");

        let head_before = array.head(&root(0)).expect("head before prune");
        assert_eq!(head_before, root(300));

        array
            .maybe_prune(root(100), &Cancellation::new())
            .expect("prune succeeds");

        // Only root(100)..=root(300) survive.
        assert_eq!(array.nodes.len(), 201);
        assert_eq!(array.indices.len(), 201);
        assert_eq!(array.finalized_root, root(100));
        assert!(!array.indices.contains_key(&root(99)));
        assert!(!array.indices.contains_key(&root(10_000)));

        // The new anchor sits at index zero with no parent, and every other
        // node's parent precedes it.
        assert_eq!(array.indices.get(&root(100)), Some(&0));
        assert_eq!(array.nodes[0].parent, None);
        for (index, node) in array.nodes.iter().enumerate().skip(1) {
            assert!(node.parent.expect("non-anchor has a parent") < index);
        }

        // Weights survive the rewrite: the new anchor accumulated the tip's
        // delta through back-propagation.
        assert_eq!(array.nodes[0].weight(), 100);

        // The canonical path from the new anchor to the head still resolves
        // and the head is unchanged.
        for i in 100..=300 {
            assert!(array.indices.contains_key(&root(i)));
        }
        assert_eq!(array.head(&root(100)).expect("head after prune"), head_before);
    }

    #[test]
    fn prune_noop_cases() {
        let mut array = new_array(root(0));
        extend_chain(&mut array, 1, 10);

        // Same finalized root: no-op even though the threshold is tiny.
        array.prune_threshold = 1;
        array
            .maybe_prune(root(0), &Cancellation::new())
            .expect("prune succeeds");
        assert_eq!(array.nodes.len(), 11);

        // Below the threshold: no-op.
        array.prune_threshold = DEFAULT_PRUNE_THRESHOLD;
        array
            .maybe_prune(root(5), &Cancellation::new())
            .expect("prune succeeds");
        assert_eq!(array.nodes.len(), 11);
        assert_eq!(array.finalized_root, root(0));
    }

    #[test]
    fn prune_unknown_root_is_rejected() {
        let mut array = new_array(root(0));
        array.prune_threshold = 1;
        extend_chain(&mut array, 1, 10);

        assert_eq!(
            array.maybe_prune(root(42_000), &Cancellation::new()),
            Err(Error::FinalizedNodeUnknown(root(42_000)))
        );
    }

    #[test]
    fn cancelled_prune_leaves_store_untouched() {
        let mut array = new_array(root(0));
        array.prune_threshold = 1;
        extend_chain(&mut array, 1, 50);

        let before = array.clone();
        let cancellation = Cancellation::new();
        cancellation.cancel();

        assert_eq!(
            array.maybe_prune(root(25), &cancellation),
            Err(Error::Cancelled)
        );
        assert_eq!(array, before);
    }
}
