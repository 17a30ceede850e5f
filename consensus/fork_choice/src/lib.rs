//! The fork-choice service: LMD-GHOST head selection over the proto-array
//! store, plus the attestation ingest pipeline that feeds it.
//!
//! External concerns (block/state storage, state transition, committee
//! shuffling) are reached through the [`BeaconBackend`] trait so this crate
//! stays free of database and networking logic. All backend I/O happens
//! before the store's locks are taken.

mod attestation_pool;
mod backend;
mod checkpoint_state_cache;
mod errors;
mod fork_choice;
pub mod metrics;

pub use crate::attestation_pool::{
    AttestationPool, Error as AttestationPoolError, InsertOutcome,
};
pub use crate::backend::{BeaconBackend, BeaconStateView, BlockSummary};
pub use crate::checkpoint_state_cache::CheckpointStateCache;
pub use crate::errors::{Error, InvalidAttestation};
pub use crate::fork_choice::ForkChoice;

// Callers hold the cancellation flag for long-running store operations.
pub use proto_array::Cancellation;
