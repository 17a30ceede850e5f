use types::{Epoch, Hash256};

#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    FinalizedNodeUnknown(Hash256),
    JustifiedNodeUnknown(Hash256),
    InvalidBestDescendant(usize),
    InvalidNodeIndex(usize),
    InvalidParentDelta(usize),
    InvalidNodeDelta(usize),
    InvalidDeltaLen {
        deltas: usize,
        nodes: usize,
    },
    /// A negative delta would drive a node's weight below zero. Weights only
    /// ever sum effective balances, so underflow means the vote or balance
    /// bookkeeping is corrupt.
    NegativeWeight(usize),
    DeltaOverflow(usize),
    IndexOverflow(&'static str),
    /// The node selected as head fails the viability check.
    InvalidBestNode {
        start_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        head_root: Hash256,
        head_justified_epoch: Epoch,
        head_finalized_epoch: Epoch,
    },
    /// The caller's cancellation flag was observed; no mutation took place.
    Cancelled,
}
