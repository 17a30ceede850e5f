//! Table-driven scenarios for the proto-array fork choice.
//!
//! Each definition is a list of operations applied to a fresh store,
//! asserting heads and store sizes along the way. The module is public so
//! other tooling can replay the scenarios.

mod ffg_updates;
mod no_votes;
mod votes;

use crate::{Cancellation, ProtoArrayForkChoice};
use types::{Epoch, Hash256, Slot};

pub use ffg_updates::*;
pub use no_votes::*;
pub use votes::*;

#[derive(Debug, Clone)]
pub enum Operation {
    FindHead {
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: Vec<u64>,
        expected_head: Hash256,
    },
    /// Like `FindHead` but the head computation is expected to fail.
    InvalidFindHead {
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: Vec<u64>,
    },
    ProcessBlock {
        slot: Slot,
        root: Hash256,
        parent_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    },
    ProcessAttestation {
        validator_index: u64,
        block_root: Hash256,
        target_epoch: Epoch,
    },
    Prune {
        finalized_root: Hash256,
        prune_threshold: usize,
        expected_len: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ForkChoiceTestDefinition {
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub finalized_root: Hash256,
    pub operations: Vec<Operation>,
}

impl ForkChoiceTestDefinition {
    pub fn run(self) {
        let fork_choice = ProtoArrayForkChoice::new(
            self.justified_epoch,
            self.finalized_epoch,
            self.finalized_root,
        )
        .expect("should instantiate fork choice");
        let cancellation = Cancellation::new();

        for (op_index, op) in self.operations.into_iter().enumerate() {
            match op.clone() {
                Operation::FindHead {
                    justified_epoch,
                    justified_root,
                    finalized_epoch,
                    justified_state_balances,
                    expected_head,
                } => {
                    let head = fork_choice
                        .head(
                            finalized_epoch,
                            justified_root,
                            &justified_state_balances,
                            justified_epoch,
                            &cancellation,
                        )
                        .unwrap_or_else(|e| {
                            panic!("head computation failed at op {}: {:?}", op_index, e)
                        });

                    assert_eq!(
                        head, expected_head,
                        "bad head at op {}: {:?}",
                        op_index, op
                    );
                }
                Operation::InvalidFindHead {
                    justified_epoch,
                    justified_root,
                    finalized_epoch,
                    justified_state_balances,
                } => {
                    let result = fork_choice.head(
                        finalized_epoch,
                        justified_root,
                        &justified_state_balances,
                        justified_epoch,
                        &cancellation,
                    );

                    assert!(
                        result.is_err(),
                        "op {} was expected to fail but produced {:?}",
                        op_index,
                        result
                    );
                }
                Operation::ProcessBlock {
                    slot,
                    root,
                    parent_root,
                    justified_epoch,
                    finalized_epoch,
                } => {
                    fork_choice
                        .process_block(slot, root, parent_root, justified_epoch, finalized_epoch)
                        .unwrap_or_else(|e| {
                            panic!("process_block failed at op {}: {:?}", op_index, e)
                        });
                }
                Operation::ProcessAttestation {
                    validator_index,
                    block_root,
                    target_epoch,
                } => {
                    fork_choice.process_attestation(&[validator_index], block_root, target_epoch);
                }
                Operation::Prune {
                    finalized_root,
                    prune_threshold,
                    expected_len,
                } => {
                    fork_choice.set_prune_threshold(prune_threshold);
                    fork_choice
                        .maybe_prune(finalized_root, &cancellation)
                        .unwrap_or_else(|e| panic!("prune failed at op {}: {:?}", op_index, e));

                    assert_eq!(
                        fork_choice.len(),
                        expected_len,
                        "bad node count after prune at op {}",
                        op_index
                    );
                }
            }
        }
    }
}

/// Gives a deterministic root; index 0 maps to the zero hash.
fn get_root(i: u64) -> Hash256 {
    Hash256::from_low_u64_be(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_votes() {
        get_no_votes_test_definition().run();
    }

    #[test]
    fn votes() {
        get_votes_test_definition().run();
    }

    #[test]
    fn votes_reversed_fork_order() {
        get_reversed_fork_order_test_definition().run();
    }

    #[test]
    fn ffg_case_01() {
        get_ffg_case_01_test_definition().run();
    }
}
