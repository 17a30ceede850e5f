mod cancellation;
mod error;
pub mod fork_choice_test_definition;
mod proto_array;
mod proto_array_fork_choice;

pub use crate::cancellation::Cancellation;
pub use crate::error::Error;
pub use crate::proto_array::{ProtoArray, ProtoNode, DEFAULT_PRUNE_THRESHOLD};
pub use crate::proto_array_fork_choice::{ElasticList, ProtoArrayForkChoice, VoteTracker};
