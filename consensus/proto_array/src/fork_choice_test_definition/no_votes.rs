use super::*;

pub fn get_no_votes_test_definition() -> ForkChoiceTestDefinition {
    let balances = vec![];
    let mut ops = vec![];

    // The head of an empty tree is the anchor itself.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(0),
    });

    // A linear chain resolves to its tip without any votes.
    //
    //          0
    //          |
    //          1
    //          |
    //          2 <- head
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
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(2),
    });

    // Two zero-weight children of the tip: the larger root wins.
    //
    //          2
    //         / \
    //        3   4 <- head
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(3),
        root: get_root(3),
        parent_root: get_root(2),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(3),
        root: get_root(4),
        parent_root: get_root(2),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(4),
    });

    // A justified root the store has never seen must fail, not guess.
    ops.push(Operation::InvalidFindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(42),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances,
    });

    ForkChoiceTestDefinition {
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        finalized_root: get_root(0),
        operations: ops,
    }
}
