use super::*;

pub fn get_ffg_case_01_test_definition() -> ForkChoiceTestDefinition {
    let balances = vec![1; 2];
    let mut ops = vec![];

    // Ensure that the head starts at the finalized block.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(0),
    });

    // Build the following chain, where justification advances along it.
    //
    //            0 <- just: 0, fin: 0
    //            |
    //            1 <- just: 0, fin: 0
    //            |
    //            2 <- just: 1, fin: 0
    //            |
    //            3 <- just: 2, fin: 1
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
        justified_epoch: Epoch::new(1),
        finalized_epoch: Epoch::new(0),
    });
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(3),
        root: get_root(3),
        parent_root: get_root(2),
        justified_epoch: Epoch::new(2),
        finalized_epoch: Epoch::new(1),
    });

    // With justified epoch 0 every node passes the filter and the tip wins.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(0),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(3),
    });

    // With justified epoch 1, node 3 (justified at 2) is filtered out and
    // the walk from node 1 stops at node 2.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(1),
        justified_root: get_root(1),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.clone(),
        expected_head: get_root(2),
    });

    // With justified epoch 2 the start is node 3 itself, which is viable
    // again.
    ops.push(Operation::FindHead {
        justified_epoch: Epoch::new(2),
        justified_root: get_root(3),
        finalized_epoch: Epoch::new(1),
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
