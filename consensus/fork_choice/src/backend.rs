use std::fmt::Debug;
use types::{AggregationBits, AttestationData, Checkpoint, Hash256, Slot, Validator};

/// The slice of a stored block the fork choice needs: enough to wire the
/// node into the tree and to reject attestations to future blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSummary {
    pub slot: Slot,
    pub parent_root: Hash256,
}

/// Read access to the beacon-state fields the engine consumes.
///
/// The state object itself belongs to the state-transition collaborator;
/// the engine never mutates one.
pub trait BeaconStateView {
    fn slot(&self) -> Slot;
    fn validators(&self) -> &[Validator];
    fn balances(&self) -> &[u64];
    fn current_justified_checkpoint(&self) -> Option<Checkpoint>;
    fn previous_justified_checkpoint(&self) -> Option<Checkpoint>;
    fn finalized_checkpoint(&self) -> Option<Checkpoint>;
    fn eth1_deposit_count(&self) -> u64;
}

/// The engine's window onto the host node: read-only block/state storage,
/// the slot-processing collaborator and the committee collaborator.
///
/// Implementations are expected to be cheap to call concurrently; the
/// service performs all backend calls outside its own locks so that disk
/// latency never stalls attestation ingest.
pub trait BeaconBackend {
    type State: BeaconStateView + Clone;
    type Error: Debug;

    /// Whether the block store holds a block with this root.
    fn has_block(&self, block_root: Hash256) -> bool;

    /// A summary of the block with this root, if stored.
    fn block_summary(&self, block_root: Hash256) -> Result<Option<BlockSummary>, Self::Error>;

    /// The post-state of the block with this root, if stored.
    fn state_by_root(&self, block_root: Hash256) -> Result<Option<Self::State>, Self::Error>;

    /// Persist a derived state under the given block root.
    fn save_state(&self, state: &Self::State, block_root: Hash256) -> Result<(), Self::Error>;

    /// UNIX time of genesis, in seconds.
    fn genesis_time(&self) -> u64;

    /// Advance `state` through empty slots up to `target_slot`.
    ///
    /// Must be deterministic. Takes the state by value and returns the
    /// advanced copy, so the caller's inputs are never mutated.
    fn process_slots(&self, state: Self::State, target_slot: Slot)
        -> Result<Self::State, Self::Error>;

    /// Resolve the validator indices attesting in `data`'s committee
    /// according to the aggregation bits.
    fn attesting_indices(
        &self,
        state: &Self::State,
        data: &AttestationData,
        aggregation_bits: &AggregationBits,
    ) -> Result<Vec<u64>, Self::Error>;
}
