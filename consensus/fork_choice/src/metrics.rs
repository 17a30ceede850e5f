//! The metrics surface of the fork-choice engine.
//!
//! Names are stable; dashboards and alerting key on them. Root gauges carry
//! the first eight bytes of the root interpreted as a little-endian integer,
//! which is enough to spot divergence between nodes at a glance.

pub use prometheus_metrics::*;
use std::sync::LazyLock;
use types::{ChainSpec, Hash256};

use crate::backend::BeaconStateView;

pub static BEACON_FINALIZED_EPOCH: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_finalized_epoch",
        "Last finalized epoch of the processed state",
    )
});
pub static BEACON_FINALIZED_ROOT: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_finalized_root",
        "Last finalized root of the processed state",
    )
});
pub static BEACON_CURRENT_JUSTIFIED_EPOCH: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_current_justified_epoch",
        "Current justified epoch of the processed state",
    )
});
pub static BEACON_CURRENT_JUSTIFIED_ROOT: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_current_justified_root",
        "Current justified root of the processed state",
    )
});
pub static BEACON_PREVIOUS_JUSTIFIED_EPOCH: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_previous_justified_epoch",
        "Previous justified epoch of the processed state",
    )
});
pub static BEACON_PREVIOUS_JUSTIFIED_ROOT: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "beacon_previous_justified_root",
        "Previous justified root of the processed state",
    )
});
pub static VALIDATOR_COUNT: LazyLock<Result<IntGaugeVec>> = LazyLock::new(|| {
    try_create_int_gauge_vec("validator_count", "The total number of validators", &["state"])
});
pub static VALIDATORS_TOTAL_BALANCE: LazyLock<Result<IntGaugeVec>> = LazyLock::new(|| {
    try_create_int_gauge_vec(
        "validators_total_balance",
        "The total balance of validators, in GWei",
        &["state"],
    )
});
pub static VALIDATORS_TOTAL_EFFECTIVE_BALANCE: LazyLock<Result<IntGaugeVec>> =
    LazyLock::new(|| {
        try_create_int_gauge_vec(
            "validators_total_effective_balance",
            "The total effective balance of validators, in GWei",
            &["state"],
        )
    });
pub static TOTAL_ELIGIBLE_BALANCES: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "total_eligible_balances",
        "The total amount of ether, in gwei, eligible for voting in the previous epoch",
    )
});
pub static TOTAL_VOTED_TARGET_BALANCES: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "total_voted_target_balances",
        "The total amount of ether, in gwei, that voted the target of the previous epoch",
    )
});
pub static CURRENT_ETH1_DATA_DEPOSIT_COUNT: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "current_eth1_data_deposit_count",
        "The current eth1 deposit count in the last processed state eth1data field",
    )
});
pub static ATT_SIGNATURE_FAILED_TO_VERIFY_WITH_CACHE: LazyLock<Result<IntCounter>> =
    LazyLock::new(|| {
        try_create_int_counter(
            "att_signature_failed_to_verify_with_cache",
            "Number of attestation signatures that failed to verify with cache on, but succeeded without cache",
        )
    });
pub static PROTO_ARRAY_HEAD_CALLS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "proto_array_head_calls",
        "Total count of proto array head computations",
    )
});
pub static PROTO_ARRAY_ATTESTATIONS_PROCESSED: LazyLock<Result<IntCounter>> =
    LazyLock::new(|| {
        try_create_int_counter(
            "proto_array_attestations_processed",
            "Total count of attestations processed into the vote cache",
        )
    });
pub static CHECKPOINT_STATE_CACHE_HITS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "checkpoint_state_cache_hits",
        "Total count of checkpoint state cache hits",
    )
});
pub static CHECKPOINT_STATE_CACHE_MISSES: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "checkpoint_state_cache_misses",
        "Total count of checkpoint state cache misses",
    )
});

/// Balance totals produced by the epoch-boundary transition; the engine
/// itself does not compute them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipationBalances {
    pub prev_epoch: u64,
    pub prev_epoch_target_attesters: u64,
}

/// Report by the external signature verifier when a cached-verification
/// result disagreed with a full verification.
pub fn inc_signature_cache_failure() {
    inc_counter(&ATT_SIGNATURE_FAILED_TO_VERIFY_WITH_CACHE);
}

fn low_64(root: Hash256) -> i64 {
    root.to_low_u64_le() as i64
}

/// Refresh the per-state gauges.
///
/// The host calls this on finalization, justification change and each
/// completed epoch-boundary transition, passing the state those events were
/// derived from.
pub fn report_epoch_metrics<V: BeaconStateView>(
    state: &V,
    spec: &ChainSpec,
    participation: Option<ParticipationBalances>,
) {
    let current_epoch = state.slot().epoch(spec.slots_per_epoch);

    // Validator counts per lifecycle stage.
    let mut pending_instances = 0;
    let mut active_instances = 0;
    let mut slashing_instances = 0;
    let mut slashed_instances = 0;
    let mut exiting_instances = 0;
    let mut exited_instances = 0;
    // Balances per stage.
    let mut pending_balance = 0_u64;
    let mut active_balance = 0_u64;
    let mut active_effective_balance = 0_u64;
    let mut exiting_balance = 0_u64;
    let mut exiting_effective_balance = 0_u64;
    let mut slashing_balance = 0_u64;
    let mut slashing_effective_balance = 0_u64;

    let balances = state.balances();
    for (index, validator) in state.validators().iter().enumerate() {
        let balance = balances.get(index).copied().unwrap_or(0);

        if validator.slashed {
            if current_epoch < validator.exit_epoch {
                slashing_instances += 1;
                slashing_balance += balance;
                slashing_effective_balance += validator.effective_balance;
            } else {
                slashed_instances += 1;
            }
            continue;
        }
        if validator.exit_epoch != spec.far_future_epoch {
            if current_epoch < validator.exit_epoch {
                exiting_instances += 1;
                exiting_balance += balance;
                exiting_effective_balance += validator.effective_balance;
            } else {
                exited_instances += 1;
            }
            continue;
        }
        if current_epoch < validator.activation_epoch {
            pending_instances += 1;
            pending_balance += balance;
            continue;
        }
        active_instances += 1;
        active_balance += balance;
        active_effective_balance += validator.effective_balance;
    }

    set_gauge_vec(&VALIDATOR_COUNT, "Pending", pending_instances);
    set_gauge_vec(&VALIDATOR_COUNT, "Active", active_instances);
    set_gauge_vec(&VALIDATOR_COUNT, "Exiting", exiting_instances);
    set_gauge_vec(&VALIDATOR_COUNT, "Exited", exited_instances);
    set_gauge_vec(&VALIDATOR_COUNT, "Slashing", slashing_instances);
    set_gauge_vec(&VALIDATOR_COUNT, "Slashed", slashed_instances);
    set_gauge_vec(&VALIDATORS_TOTAL_BALANCE, "Pending", pending_balance as i64);
    set_gauge_vec(&VALIDATORS_TOTAL_BALANCE, "Active", active_balance as i64);
    set_gauge_vec(&VALIDATORS_TOTAL_BALANCE, "Exiting", exiting_balance as i64);
    set_gauge_vec(&VALIDATORS_TOTAL_BALANCE, "Slashing", slashing_balance as i64);
    set_gauge_vec(
        &VALIDATORS_TOTAL_EFFECTIVE_BALANCE,
        "Active",
        active_effective_balance as i64,
    );
    set_gauge_vec(
        &VALIDATORS_TOTAL_EFFECTIVE_BALANCE,
        "Exiting",
        exiting_effective_balance as i64,
    );
    set_gauge_vec(
        &VALIDATORS_TOTAL_EFFECTIVE_BALANCE,
        "Slashing",
        slashing_effective_balance as i64,
    );

    if let Some(checkpoint) = state.current_justified_checkpoint() {
        set_gauge(
            &BEACON_CURRENT_JUSTIFIED_EPOCH,
            checkpoint.epoch.as_u64() as i64,
        );
        set_gauge(&BEACON_CURRENT_JUSTIFIED_ROOT, low_64(checkpoint.root));
    }
    if let Some(checkpoint) = state.previous_justified_checkpoint() {
        set_gauge(
            &BEACON_PREVIOUS_JUSTIFIED_EPOCH,
            checkpoint.epoch.as_u64() as i64,
        );
        set_gauge(&BEACON_PREVIOUS_JUSTIFIED_ROOT, low_64(checkpoint.root));
    }
    if let Some(checkpoint) = state.finalized_checkpoint() {
        set_gauge(&BEACON_FINALIZED_EPOCH, checkpoint.epoch.as_u64() as i64);
        set_gauge(&BEACON_FINALIZED_ROOT, low_64(checkpoint.root));
    }

    set_gauge(
        &CURRENT_ETH1_DATA_DEPOSIT_COUNT,
        state.eth1_deposit_count() as i64,
    );

    if let Some(participation) = participation {
        set_gauge(&TOTAL_ELIGIBLE_BALANCES, participation.prev_epoch as i64);
        set_gauge(
            &TOTAL_VOTED_TARGET_BALANCES,
            participation.prev_epoch_target_attesters as i64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Checkpoint, Epoch, Slot, Validator};

    struct TestState {
        slot: Slot,
        validators: Vec<Validator>,
        balances: Vec<u64>,
        finalized: Option<Checkpoint>,
    }

    impl BeaconStateView for TestState {
        fn slot(&self) -> Slot {
            self.slot
        }
        fn validators(&self) -> &[Validator] {
            &self.validators
        }
        fn balances(&self) -> &[u64] {
            &self.balances
        }
        fn current_justified_checkpoint(&self) -> Option<Checkpoint> {
            None
        }
        fn previous_justified_checkpoint(&self) -> Option<Checkpoint> {
            None
        }
        fn finalized_checkpoint(&self) -> Option<Checkpoint> {
            self.finalized
        }
        fn eth1_deposit_count(&self) -> u64 {
            42
        }
    }

    fn validator(
        spec: &ChainSpec,
        slashed: bool,
        activation_epoch: u64,
        exit_epoch: Option<u64>,
    ) -> Validator {
        Validator {
            effective_balance: 32_000_000_000,
            slashed,
            activation_epoch: Epoch::new(activation_epoch),
            exit_epoch: exit_epoch.map(Epoch::new).unwrap_or(spec.far_future_epoch),
        }
    }

    fn gauge_value(gauge_vec: &Result<IntGaugeVec>, label: &str) -> i64 {
        gauge_vec
            .as_ref()
            .unwrap()
            .get_metric_with_label_values(&[label])
            .unwrap()
            .get()
    }

    #[test]
    fn classifies_validator_lifecycle_stages() {
        let spec = ChainSpec::mainnet();
        // The state sits in epoch 10.
        let state = TestState {
            slot: Epoch::new(10).start_slot(spec.slots_per_epoch),
            validators: vec![
                // Active: past activation, no exit scheduled.
                validator(&spec, false, 0, None),
                // Pending: activates in the future.
                validator(&spec, false, 20, None),
                // Exiting: exit scheduled but not reached.
                validator(&spec, false, 0, Some(15)),
                // Exited: exit in the past.
                validator(&spec, false, 0, Some(5)),
                // Slashing: slashed, still within its exit window.
                validator(&spec, true, 0, Some(15)),
                // Slashed: slashed and past its exit epoch.
                validator(&spec, true, 0, Some(5)),
            ],
            balances: vec![31_000_000_000; 6],
            finalized: Some(Checkpoint {
                epoch: Epoch::new(9),
                root: types::Hash256::from_low_u64_le(7),
            }),
        };

        report_epoch_metrics(
            &state,
            &spec,
            Some(ParticipationBalances {
                prev_epoch: 1_000,
                prev_epoch_target_attesters: 900,
            }),
        );

        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Active"), 1);
        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Pending"), 1);
        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Exiting"), 1);
        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Exited"), 1);
        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Slashing"), 1);
        assert_eq!(gauge_value(&VALIDATOR_COUNT, "Slashed"), 1);

        // Slashed and exited validators contribute no balance gauges.
        assert_eq!(
            gauge_value(&VALIDATORS_TOTAL_BALANCE, "Active"),
            31_000_000_000
        );
        assert_eq!(
            gauge_value(&VALIDATORS_TOTAL_EFFECTIVE_BALANCE, "Slashing"),
            32_000_000_000
        );

        assert_eq!(BEACON_FINALIZED_EPOCH.as_ref().unwrap().get(), 9);
        assert_eq!(BEACON_FINALIZED_ROOT.as_ref().unwrap().get(), 7);
        assert_eq!(
            CURRENT_ETH1_DATA_DEPOSIT_COUNT.as_ref().unwrap().get(),
            42
        );
        assert_eq!(TOTAL_ELIGIBLE_BALANCES.as_ref().unwrap().get(), 1_000);
        assert_eq!(TOTAL_VOTED_TARGET_BALANCES.as_ref().unwrap().get(), 900);
    }
}

