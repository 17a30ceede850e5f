use crate::AttestationData;
use ssz_types::{typenum::U2048, BitList};

/// Aggregation bitfield sized for `MAX_VALIDATORS_PER_COMMITTEE`.
pub type AggregationBits = BitList<U2048>;

/// A committee attestation, after wire decoding and signature verification
/// have happened upstream. The engine only consumes the aggregation bits and
/// the attested data, so no signature is carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct Attestation {
    pub aggregation_bits: AggregationBits,
    pub data: AttestationData,
}

impl Attestation {
    /// Aggregate another attestation into `self`.
    ///
    /// The attestations must be over the same `AttestationData`. It is a
    /// logic error to aggregate across differing data.
    pub fn aggregate(&mut self, other: &Self) {
        debug_assert_eq!(self.data, other.data);
        self.aggregation_bits = self.aggregation_bits.union(&other.aggregation_bits);
    }
}
