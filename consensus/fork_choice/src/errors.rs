use crate::attestation_pool;
use std::fmt;
use types::{Epoch, Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// The attestation failed validation and was dropped.
    InvalidAttestation(InvalidAttestation),
    /// The underlying store rejected an operation.
    ProtoArray(proto_array::Error),
    AttestationPool(attestation_pool::Error),
    /// A block-store or state-store failure, propagated unchanged.
    Backend(E),
    /// An earlier invariant violation latched the store shut. Rebuild the
    /// service from the last finalized checkpoint to clear it.
    StoreCorrupted,
}

impl<E> From<InvalidAttestation> for Error<E> {
    fn from(e: InvalidAttestation) -> Self {
        Error::InvalidAttestation(e)
    }
}

impl<E> From<proto_array::Error> for Error<E> {
    fn from(e: proto_array::Error) -> Self {
        Error::ProtoArray(e)
    }
}

impl<E> From<attestation_pool::Error> for Error<E> {
    fn from(e: attestation_pool::Error) -> Self {
        Error::AttestationPool(e)
    }
}

/// The reasons an attestation is refused by the ingest pipeline.
///
/// The `Display` output is the operator-facing message and is relied upon by
/// monitoring; treat the wording as stable.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidAttestation {
    /// The target epoch is neither the wall-clock epoch nor its predecessor.
    BadTargetEpoch {
        target: Epoch,
        current: Epoch,
        prev: Epoch,
    },
    /// The target root is not in the block store.
    UnknownTargetRoot(Hash256),
    /// `attestation.data.slot` falls outside the target epoch.
    SlotNotInTargetEpoch {
        slot_epoch: Epoch,
        target_epoch: Epoch,
    },
    /// No pre-state is available for the target block.
    MissingPreState { slot: Slot },
    /// The resolved pre-state sits in a different epoch than the target.
    WrongEpochPreState { target: Epoch, current: Epoch },
    /// The `beacon_block_root` block is unknown.
    UnknownBeaconBlock(Hash256),
    /// The attestation votes for a block newer than itself.
    FutureBlock {
        block_slot: Slot,
        attestation_slot: Slot,
    },
}

impl fmt::Display for InvalidAttestation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InvalidAttestation::BadTargetEpoch {
                target,
                current,
                prev,
            } => write!(
                f,
                "target epoch {} does not match current epoch {} or prev epoch {}",
                target, current, prev
            ),
            InvalidAttestation::UnknownTargetRoot(_) => {
                write!(f, "target root does not exist in db")
            }
            InvalidAttestation::SlotNotInTargetEpoch {
                slot_epoch,
                target_epoch,
            } => write!(
                f,
                "data slot is not in the same epoch as target {} != {}",
                slot_epoch, target_epoch
            ),
            InvalidAttestation::MissingPreState { slot } => {
                write!(f, "pre state of target block {} does not exist", slot)
            }
            InvalidAttestation::WrongEpochPreState { target, current } => write!(
                f,
                "target epoch {} does not match current epoch {}",
                target, current
            ),
            InvalidAttestation::UnknownBeaconBlock(root) => {
                write!(f, "beacon block {:?} does not exist", root)
            }
            InvalidAttestation::FutureBlock {
                block_slot,
                attestation_slot,
            } => write!(
                f,
                "could not process attestation for future block, {} > {}",
                block_slot, attestation_slot
            ),
        }
    }
}
