use parking_lot::RwLock;
use std::collections::HashMap;
use tree_hash::TreeHash;
use types::{Attestation, AttestationData, Hash256, Slot};

/// The number of slots of attestations kept. When the pool sees a slot this
/// far ahead of an entry, the entry is dropped and attestations that old are
/// refused.
const SLOTS_RETAINED: usize = 3;

/// Returned upon successfully inserting an attestation into the pool.
#[derive(Debug, PartialEq)]
pub enum InsertOutcome {
    /// The `attestation.data` had not been seen before.
    NewAttestationData,
    /// The data was known and the attestation contributed new aggregation
    /// bits, which were OR-ed into the stored record.
    BitsAggregated,
    /// Every aggregation bit was already present; nothing changed.
    AlreadyKnown,
}

#[derive(Debug, PartialEq)]
pub enum Error {
    /// The attestation is older than the pool retains.
    SlotTooLow {
        slot: Slot,
        lowest_permissible_slot: Slot,
    },
    /// The function to obtain a map index failed, this is an internal error.
    InvalidMapIndex(usize),
    /// The attestation landed in the wrong slot map, this is an internal
    /// error.
    IncorrectSlot { expected: Slot, attestation: Slot },
}

/// Attestations for a single slot, keyed by the tree-hash root of their
/// `AttestationData`.
struct SlotMap {
    slot: Slot,
    map: HashMap<Hash256, Attestation>,
}

impl SlotMap {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            map: <_>::default(),
        }
    }

    fn insert(&mut self, a: &Attestation) -> Result<InsertOutcome, Error> {
        if a.data.slot != self.slot {
            return Err(Error::IncorrectSlot {
                expected: self.slot,
                attestation: a.data.slot,
            });
        }

        let data_root = a.data.tree_hash_root();

        if let Some(existing) = self.map.get_mut(&data_root) {
            let union = existing.aggregation_bits.union(&a.aggregation_bits);

            if union == existing.aggregation_bits {
                Ok(InsertOutcome::AlreadyKnown)
            } else {
                existing.aggregation_bits = union;
                Ok(InsertOutcome::BitsAggregated)
            }
        } else {
            self.map.insert(data_root, a.clone());
            Ok(InsertOutcome::NewAttestationData)
        }
    }

    fn get(&self, data: &AttestationData) -> Option<Attestation> {
        self.map.get(&data.tree_hash_root()).cloned()
    }
}

/// An in-memory pool that aggregates raw attestations as they arrive.
///
/// Each insert OR-s the attestation's aggregation bits into the record with
/// the same data root, so resubmitting an identical attestation is
/// idempotent. The pool holds a window of `SLOTS_RETAINED` slots and prunes
/// itself as the observed slots advance.
pub struct AttestationPool {
    lowest_permissible_slot: RwLock<Slot>,
    maps: RwLock<Vec<SlotMap>>,
}

impl Default for AttestationPool {
    fn default() -> Self {
        Self {
            lowest_permissible_slot: RwLock::new(Slot::new(0)),
            maps: RwLock::new(vec![]),
        }
    }
}

impl AttestationPool {
    pub fn insert(&self, attestation: &Attestation) -> Result<InsertOutcome, Error> {
        let lowest_permissible_slot = *self.lowest_permissible_slot.read();

        if attestation.data.slot < lowest_permissible_slot {
            return Err(Error::SlotTooLow {
                slot: attestation.data.slot,
                lowest_permissible_slot,
            });
        }

        // This attestation implies the chain advanced; drop expired slots.
        if (lowest_permissible_slot + SLOTS_RETAINED as u64) < attestation.data.slot + 1 {
            self.prune(attestation.data.slot)
        }

        let index = self.get_map_index(attestation.data.slot);

        self.maps
            .write()
            .get_mut(index)
            .ok_or(Error::InvalidMapIndex(index))?
            .insert(attestation)
    }

    /// The aggregated attestation stored for `data`, if any.
    pub fn get(&self, data: &AttestationData) -> Option<Attestation> {
        self.maps
            .read()
            .iter()
            .find(|map| map.slot == data.slot)
            .and_then(|map| map.get(data))
    }

    /// Remove all attestations older than `current_slot - SLOTS_RETAINED`
    /// and refuse any further ones.
    pub fn prune(&self, current_slot: Slot) {
        // `Slot` subtraction saturates at zero.
        let lowest_permissible_slot = current_slot - SLOTS_RETAINED as u64;

        self.maps
            .write()
            .retain(|map| map.slot >= lowest_permissible_slot);

        *self.lowest_permissible_slot.write() = lowest_permissible_slot;
    }

    /// The index in `self.maps` holding `slot`, creating or recycling a map
    /// if needed.
    fn get_map_index(&self, slot: Slot) -> usize {
        let mut maps = self.maps.write();

        if let Some(index) = maps.iter().position(|map| map.slot == slot) {
            return index;
        }

        if maps.len() < SLOTS_RETAINED {
            let index = maps.len();
            maps.push(SlotMap::new(slot));
            return index;
        }

        let index = maps
            .iter()
            .enumerate()
            .min_by_key(|(_, map)| map.slot)
            .map(|(i, _)| i)
            .expect("maps cannot be empty, len checked above");

        maps[index] = SlotMap::new(slot);

        index
    }
}
