use super::*;

const GWEI_32: u64 = 32_000_000_000;

pub fn get_votes_test_definition() -> ForkChoiceTestDefinition {
    let balances = vec![GWEI_32; 2];
    let mut ops = vec![];

    // Build a fork of two equal-slot blocks on a common parent.
    //
    //           0
    //           |
    //           1
    //          / \
    //         2   3
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(1),
        root: get_root(1),
        parent_root: get_root(0),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(2),
        root: get_root(2),
        parent_root: get_root(1),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(2),
        root: get_root(3),
        parent_root: get_root(1),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });

    // One vote each: equal weights, the larger root wins the tie.
    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(2),
        target_epoch: Epoch::new(1),
    });
    ops.push(Operation::ProcessAttestation {
        validator_index: 1,
        block_root: get_root(3),
        target_epoch: Epoch::new(1),
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(3),
    });

    // A duplicate of an already-counted vote changes nothing.
    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(2),
        target_epoch: Epoch::new(1),
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(3),
    });

    // Validator 1 switches sides at a higher epoch: block 2 now carries both
    // balances.
    ops.push(Operation::ProcessAttestation {
        validator_index: 1,
        block_root: get_root(2),
        target_epoch: Epoch::new(2),
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(2),
    });

    // Validator 1's balance drops to zero; block 2 still leads on
    // validator 0 alone.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: vec![GWEI_32, 0],
        expected_head: get_root(2),
    });

    // Extend the losing branch and move validator 0 onto it. With the
    // balances restored both branches weigh the same, so the fork with the
    // larger root (3) wins and the head is its new tip.
    //
    //           1
    //          / \
    //         2   3
    //             |
    //             4 <- head
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(3),
        root: get_root(4),
        parent_root: get_root(3),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(4),
        target_epoch: Epoch::new(3),
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(4),
    });

    // Finalize block 3: only its subtree survives, the head is unmoved and
    // the vote for the pruned block 2 is silently dropped on the next
    // recomputation.
    ops.push(Operation::Prune {
        finalized_root: get_root(3),
        prune_threshold: 1,
        expected_len: 2,
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(3),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances,
        expected_head: get_root(4),
    });

    ForkChoiceTestDefinition {
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        finalized_root: get_root(0),
        operations: ops,
    }
}

/// The mirror image of the fork in `get_votes_test_definition`: the fork
/// blocks arrive in the opposite order and the winner must not change.
pub fn get_reversed_fork_order_test_definition() -> ForkChoiceTestDefinition {
    let balances = vec![GWEI_32; 2];
    let mut ops = vec![];

    ops.push(Operation::ProcessBlock {
        slot: Slot::new(1),
        root: get_root(1),
        parent_root: get_root(0),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(2),
        root: get_root(3),
        parent_root: get_root(1),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(2),
        root: get_root(2),
        parent_root: get_root(1),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });

    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(2),
        target_epoch: Epoch::new(1),
    });
    ops.push(Operation::ProcessAttestation {
        validator_index: 1,
        block_root: get_root(3),
        target_epoch: Epoch::new(1),
    });

    // Same weights, same winner, despite the reversed insertion order.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances,
        expected_head: get_root(3),
    });

    ForkChoiceTestDefinition {
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        finalized_root: get_root(0),
        operations: ops,
    }
}
