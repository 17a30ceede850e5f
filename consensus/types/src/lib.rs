//! Domain primitives shared by the fork-choice crates.
//!
//! The types here are deliberately minimal: the fork-choice engine only ever
//! sees block summaries, checkpoints and attestations that have already been
//! decoded and signature-verified upstream.

mod attestation;
mod attestation_data;
mod chain_spec;
mod checkpoint;
mod slot_epoch;
mod validator;

pub use crate::attestation::{AggregationBits, Attestation};
pub use crate::attestation_data::AttestationData;
pub use crate::chain_spec::ChainSpec;
pub use crate::checkpoint::Checkpoint;
pub use crate::slot_epoch::{Epoch, Slot};
pub use crate::validator::Validator;

pub type Hash256 = ethereum_types::H256;
