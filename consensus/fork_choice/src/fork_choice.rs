use crate::attestation_pool::AttestationPool;
use crate::backend::{BeaconBackend, BeaconStateView};
use crate::checkpoint_state_cache::CheckpointStateCache;
use crate::errors::{Error, InvalidAttestation};
use crate::metrics;
use proto_array::{Cancellation, ProtoArrayForkChoice};
use slog::{error, warn, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use types::{Attestation, AttestationData, ChainSpec, Checkpoint, Epoch, Hash256, Slot};

/// The fork-choice service: owns the proto-array store, the checkpoint-state
/// cache and the attestation pool, and drives the ingest pipeline between
/// them.
///
/// One instance has a single logical owner. Mutations serialize on the
/// store's own locks; everything fetched from the backend is fetched before
/// those locks are taken.
pub struct ForkChoice<B: BeaconBackend> {
    backend: Arc<B>,
    proto_array: ProtoArrayForkChoice,
    checkpoint_states: CheckpointStateCache<B::State>,
    attestation_pool: AttestationPool,
    spec: ChainSpec,
    /// Set when an internal invariant violation is detected; all further
    /// mutations are refused until the service is rebuilt from the last
    /// finalized checkpoint.
    corrupted: AtomicBool,
    log: Logger,
}

impl<B: BeaconBackend> ForkChoice<B> {
    pub fn new(
        backend: Arc<B>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        finalized_root: Hash256,
        spec: ChainSpec,
        log: Logger,
    ) -> Result<Self, Error<B::Error>> {
        let proto_array =
            ProtoArrayForkChoice::new(justified_epoch, finalized_epoch, finalized_root)?;

        Ok(Self {
            backend,
            proto_array,
            checkpoint_states: CheckpointStateCache::new(),
            attestation_pool: AttestationPool::default(),
            spec,
            corrupted: AtomicBool::new(false),
            log,
        })
    }

    /// Insert a block into the block tree.
    ///
    /// The block must already be fully verified; fork choice trusts its
    /// justified/finalized epochs as given.
    pub fn process_block(
        &self,
        slot: Slot,
        block_root: Hash256,
        parent_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error<B::Error>> {
        self.check_store_health()?;

        self.proto_array
            .process_block(slot, block_root, parent_root, justified_epoch, finalized_epoch)
            .map_err(|e| self.on_proto_array_error(e))
    }

    /// Record target votes for a set of validators.
    pub fn process_attestation(
        &self,
        validator_indices: &[u64],
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error<B::Error>> {
        self.check_store_health()?;

        self.proto_array
            .process_attestation(validator_indices, block_root, target_epoch);
        metrics::inc_counter(&metrics::PROTO_ARRAY_ATTESTATIONS_PROCESSED);

        Ok(())
    }

    /// Recompute the canonical head from the justified checkpoint.
    ///
    /// `justified_state_balances` are the effective balances of the state at
    /// `justified_root`; the delta against the previous snapshot is what
    /// moves weight through the tree.
    pub fn head(
        &self,
        finalized_epoch: Epoch,
        justified_root: Hash256,
        justified_state_balances: &[u64],
        justified_epoch: Epoch,
        cancellation: &Cancellation,
    ) -> Result<Hash256, Error<B::Error>> {
        self.check_store_health()?;
        metrics::inc_counter(&metrics::PROTO_ARRAY_HEAD_CALLS);

        self.proto_array
            .head(
                finalized_epoch,
                justified_root,
                justified_state_balances,
                justified_epoch,
                cancellation,
            )
            .map_err(|e| self.on_proto_array_error(e))
    }

    /// Prune the block tree and the checkpoint-state cache upon
    /// finalization.
    pub fn prune(
        &self,
        finalized_root: Hash256,
        cancellation: &Cancellation,
    ) -> Result<(), Error<B::Error>> {
        self.check_store_health()?;

        self.proto_array
            .maybe_prune(finalized_root, cancellation)
            .map_err(|e| self.on_proto_array_error(e))?;

        // States for checkpoints below the finalized epoch can never
        // validate another attestation.
        self.checkpoint_states
            .prune(self.proto_array.finalized_epoch());

        Ok(())
    }

    /// Validate an attestation, feed its votes into the store and aggregate
    /// it into the pool.
    ///
    /// Returns the (possibly wider) aggregate stored for the same
    /// attestation data. Validation failures are logged at WARN and returned
    /// to the caller; the attestation is dropped.
    pub fn on_attestation(&self, attestation: &Attestation) -> Result<Attestation, Error<B::Error>> {
        self.check_store_health()?;

        match self.validate_and_apply(attestation) {
            Ok(aggregated) => Ok(aggregated),
            Err(e) => {
                if let Error::InvalidAttestation(reason) = &e {
                    let target_epoch = attestation.data.target.epoch;
                    let slot = attestation.data.slot;
                    warn!(
                        self.log,
                        "Rejected attestation";
                        "reason" => %reason,
                        "target_epoch" => %target_epoch,
                        "slot" => %slot
                    );
                }
                Err(e)
            }
        }
    }

    fn validate_and_apply(&self, attestation: &Attestation) -> Result<Attestation, Error<B::Error>> {
        let data = &attestation.data;
        let target = data.target;

        // The wall-clock window check comes first; it needs no I/O.
        verify_attestation_target_epoch(
            self.backend.genesis_time(),
            unix_time_now(),
            &target,
            &self.spec,
        )?;

        if !self.backend.has_block(target.root) {
            return Err(InvalidAttestation::UnknownTargetRoot(target.root).into());
        }

        let slot_epoch = data.slot.epoch(self.spec.slots_per_epoch);
        if slot_epoch != target.epoch {
            return Err(InvalidAttestation::SlotNotInTargetEpoch {
                slot_epoch,
                target_epoch: target.epoch,
            }
            .into());
        }

        let pre_state = self.get_attestation_pre_state(&target)?;

        let pre_state_epoch = pre_state.slot().epoch(self.spec.slots_per_epoch);
        if pre_state_epoch != target.epoch {
            return Err(InvalidAttestation::WrongEpochPreState {
                target: target.epoch,
                current: pre_state_epoch,
            }
            .into());
        }

        self.verify_beacon_block(data)?;

        let validator_indices = self
            .backend
            .attesting_indices(&pre_state, data, &attestation.aggregation_bits)
            .map_err(Error::Backend)?;

        self.process_attestation(&validator_indices, data.beacon_block_root, target.epoch)?;

        self.attestation_pool.insert(attestation)?;
        Ok(self
            .attestation_pool
            .get(data)
            .unwrap_or_else(|| attestation.clone()))
    }

    /// The pre-state used to validate attestations at `checkpoint`.
    ///
    /// Falls back from the cache to the state store, advancing the base
    /// state to the start of the checkpoint epoch when it is behind. The
    /// derived state is persisted and cached before being returned.
    fn get_attestation_pre_state(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<B::State, Error<B::Error>> {
        if let Some(state) = self.checkpoint_states.state_by_checkpoint(checkpoint) {
            return Ok(state);
        }

        let target_slot = checkpoint.epoch.start_slot(self.spec.slots_per_epoch);

        let base_state = self
            .backend
            .state_by_root(checkpoint.root)
            .map_err(Error::Backend)?
            .ok_or(InvalidAttestation::MissingPreState { slot: target_slot })?;

        let pre_state = if base_state.slot().epoch(self.spec.slots_per_epoch) < checkpoint.epoch {
            let advanced = self
                .backend
                .process_slots(base_state, target_slot)
                .map_err(Error::Backend)?;
            // Keep the derived state so a restart re-reads it instead of
            // replaying the slots.
            self.backend
                .save_state(&advanced, checkpoint.root)
                .map_err(Error::Backend)?;
            advanced
        } else {
            // The checkpoint epoch is already materialised in the base
            // state.
            base_state
        };

        self.checkpoint_states.insert(*checkpoint, pre_state.clone());

        Ok(pre_state)
    }

    /// The LMD vote must reference a known block no newer than the
    /// attestation itself.
    fn verify_beacon_block(&self, data: &AttestationData) -> Result<(), Error<B::Error>> {
        let block = self
            .backend
            .block_summary(data.beacon_block_root)
            .map_err(Error::Backend)?
            .ok_or(InvalidAttestation::UnknownBeaconBlock(data.beacon_block_root))?;

        if block.slot > data.slot {
            return Err(InvalidAttestation::FutureBlock {
                block_slot: block.slot,
                attestation_slot: data.slot,
            }
            .into());
        }

        Ok(())
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
    }

    pub fn block_slot(&self, block_root: &Hash256) -> Option<Slot> {
        self.proto_array.block_slot(block_root)
    }

    pub fn latest_message(&self, validator_index: u64) -> Option<(Hash256, Epoch)> {
        self.proto_array.latest_message(validator_index)
    }

    pub fn len(&self) -> usize {
        self.proto_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proto_array.is_empty()
    }

    /// Direct access to the proto-array wrapper, for inspection tooling.
    pub fn proto_array(&self) -> &ProtoArrayForkChoice {
        &self.proto_array
    }

    fn check_store_health(&self) -> Result<(), Error<B::Error>> {
        if self.corrupted.load(Ordering::Relaxed) {
            return Err(Error::StoreCorrupted);
        }
        Ok(())
    }

    /// Classify a store error. Unknown-root lookups and cancellations are
    /// ordinary outcomes; anything else means the store's internal
    /// invariants no longer hold, so it is latched shut.
    fn on_proto_array_error(&self, e: proto_array::Error) -> Error<B::Error> {
        let recoverable = matches!(
            e,
            proto_array::Error::JustifiedNodeUnknown(_)
                | proto_array::Error::FinalizedNodeUnknown(_)
                | proto_array::Error::Cancelled
        );

        if !recoverable {
            error!(
                self.log,
                "Fork choice store invariant violated, refusing further mutations";
                "error" => ?e
            );
            self.corrupted.store(true, Ordering::Relaxed);
        }

        Error::ProtoArray(e)
    }
}

/// Check that the target epoch is the wall-clock epoch or its predecessor.
fn verify_attestation_target_epoch<E>(
    genesis_time: u64,
    now: u64,
    target: &Checkpoint,
    spec: &ChainSpec,
) -> Result<(), Error<E>> {
    let seconds_since_genesis = now.saturating_sub(genesis_time);
    let current_slot = Slot::new(seconds_since_genesis / spec.seconds_per_slot);
    let current_epoch = current_slot.epoch(spec.slots_per_epoch);
    let prev_epoch = current_epoch - 1;

    if target.epoch != current_epoch && target.epoch != prev_epoch {
        return Err(InvalidAttestation::BadTargetEpoch {
            target: target.epoch,
            current: current_epoch,
            prev: prev_epoch,
        }
        .into());
    }

    Ok(())
}

fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
