use crate::{Checkpoint, Hash256, Slot};
use serde_derive::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

/// The data upon which an attestation is based.
///
/// Two attestations with equal `AttestationData` (and therefore an equal
/// tree-hash root) may be aggregated together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize, TreeHash)]
pub struct AttestationData {
    pub slot: Slot,
    /// The index of the attesting committee within the slot.
    pub index: u64,
    /// LMD-GHOST vote.
    pub beacon_block_root: Hash256,
    /// FFG vote.
    pub source: Checkpoint,
    pub target: Checkpoint,
}
