use crate::{Epoch, Hash256};
use serde_derive::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

/// Casper FFG checkpoint, used in attestations and as the key for the
/// checkpoint-state cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize, TreeHash)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}
