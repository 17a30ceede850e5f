use crate::Epoch;
use serde_derive::{Deserialize, Serialize};

/// The subset of the on-chain validator record the fork-choice metrics
/// surface reads. Registration, withdrawal and credential fields live with
/// the state-transition collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
}
