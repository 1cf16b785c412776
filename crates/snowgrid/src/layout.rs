use crate::{Error, Result};
use core::fmt;

/// Bits shared between the data center ID and the worker ID.
pub const TOTAL_ID_BITS: u8 = 10;

/// Bits reserved for the intra-millisecond sequence.
pub const SEQUENCE_BITS: u8 = 12;

/// Bits reserved for the timestamp delta since the start time.
pub const TIMESTAMP_BITS: u8 = 41;

/// Largest value the sequence can take before rolling over.
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Largest timestamp delta (milliseconds since the start time) that still fits.
pub const MAX_TIMESTAMP_DELTA: u64 = (1 << TIMESTAMP_BITS) - 1;

/// The bit layout of a 64-bit ID, parameterised by the worker bit width.
///
/// ```text
///  Bit Index:  63           63 62            22 21        12+w 11+w      12 11         0
///              +--------------+----------------+---------------+----------+------------+
///  Field:      | reserved (1) | timestamp (41) | data center   | worker   | sequence   |
///              +--------------+----------------+---------------+----------+------------+
///                                               |<- 10 - w ->| |<-  w  ->|
/// ```
///
/// The data center and worker IDs together always occupy
/// [`TOTAL_ID_BITS`]; `worker_bits` only decides where the split falls. All
/// encoders that share an ID namespace must agree on the layout.
///
/// # Example
///
/// ```
/// use snowgrid::IdLayout;
///
/// let layout = IdLayout::new(5).unwrap();
/// assert_eq!(layout.max_worker_id(), 31);
/// assert_eq!(layout.max_data_center_id(), 31);
///
/// let id = layout.compose(1_000, 3, 7, 42);
/// let decoded = layout.decode(id);
/// assert_eq!(decoded.timestamp_delta, 1_000);
/// assert_eq!(decoded.data_center_id, 3);
/// assert_eq!(decoded.worker_id, 7);
/// assert_eq!(decoded.sequence, 42);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdLayout {
    worker_bits: u8,
}

impl IdLayout {
    /// The smallest accepted worker bit width.
    pub const MIN_WORKER_BITS: u8 = 1;

    /// The largest accepted worker bit width. At least one bit is always left
    /// for the data center.
    pub const MAX_WORKER_BITS: u8 = TOTAL_ID_BITS - 1;

    /// Creates a layout, validating the worker bit width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWorkerBits`] when `worker_bits` is outside
    /// `[1, 9]`.
    pub const fn new(worker_bits: u8) -> Result<Self> {
        if worker_bits < Self::MIN_WORKER_BITS || worker_bits > Self::MAX_WORKER_BITS {
            return Err(Error::InvalidWorkerBits {
                got: worker_bits,
                max: Self::MAX_WORKER_BITS,
            });
        }
        Ok(Self { worker_bits })
    }

    pub const fn worker_bits(&self) -> u8 {
        self.worker_bits
    }

    pub const fn data_center_bits(&self) -> u8 {
        TOTAL_ID_BITS - self.worker_bits
    }

    pub const fn max_worker_id(&self) -> u32 {
        (1 << self.worker_bits) - 1
    }

    pub const fn max_data_center_id(&self) -> u32 {
        (1 << self.data_center_bits()) - 1
    }

    const fn worker_shift(&self) -> u8 {
        SEQUENCE_BITS
    }

    const fn data_center_shift(&self) -> u8 {
        SEQUENCE_BITS + self.worker_bits
    }

    const fn timestamp_shift(&self) -> u8 {
        SEQUENCE_BITS + TOTAL_ID_BITS
    }

    /// Packs the components into an ID.
    ///
    /// Components are masked to their field widths; callers are expected to
    /// have validated them (see [`Worker::create`]).
    ///
    /// [`Worker::create`]: crate::Worker::create
    pub const fn compose(
        &self,
        timestamp_delta: u64,
        data_center_id: u32,
        worker_id: u32,
        sequence: u16,
    ) -> i64 {
        let raw = ((timestamp_delta & MAX_TIMESTAMP_DELTA) << self.timestamp_shift())
            | (((data_center_id & self.max_data_center_id()) as u64) << self.data_center_shift())
            | (((worker_id & self.max_worker_id()) as u64) << self.worker_shift())
            | ((sequence & MAX_SEQUENCE) as u64);
        raw as i64
    }

    /// Splits an ID back into its components.
    pub const fn decode(&self, id: i64) -> DecodedId {
        let raw = id as u64;
        DecodedId {
            timestamp_delta: (raw >> self.timestamp_shift()) & MAX_TIMESTAMP_DELTA,
            data_center_id: ((raw >> self.data_center_shift()) as u32) & self.max_data_center_id(),
            worker_id: ((raw >> self.worker_shift()) as u32) & self.max_worker_id(),
            sequence: (raw as u16) & MAX_SEQUENCE,
        }
    }
}

/// The components of a decoded ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecodedId {
    /// Milliseconds elapsed since the encoder's start time.
    pub timestamp_delta: u64,
    pub data_center_id: u32,
    pub worker_id: u32,
    pub sequence: u16,
}

impl fmt::Display for DecodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecodedId {{ timestamp_delta: {}, data_center_id: {}, worker_id: {}, sequence: {} }}",
            self.timestamp_delta, self.data_center_id, self.worker_id, self.sequence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_worker_bits() {
        assert_eq!(
            IdLayout::new(0),
            Err(Error::InvalidWorkerBits { got: 0, max: 9 })
        );
        assert_eq!(
            IdLayout::new(10),
            Err(Error::InvalidWorkerBits { got: 10, max: 9 })
        );
        assert!(IdLayout::new(1).is_ok());
        assert!(IdLayout::new(9).is_ok());
    }

    #[test]
    fn worker_and_data_center_share_ten_bits() {
        for bits in 1..=9 {
            let layout = IdLayout::new(bits).unwrap();
            assert_eq!(layout.worker_bits() + layout.data_center_bits(), 10);
            assert_eq!(
                (layout.max_worker_id() + 1) * (layout.max_data_center_id() + 1),
                1024
            );
        }
    }

    #[test]
    fn compose_matches_reference_shifts() {
        let layout = IdLayout::new(5).unwrap();
        let id = layout.compose(123_456, 17, 9, 4000);
        let expected = (123_456_i64 << 22) | (17 << 17) | (9 << 12) | 4000;
        assert_eq!(id, expected);
    }

    #[test]
    fn decode_recovers_components_for_every_width() {
        for bits in 1..=9 {
            let layout = IdLayout::new(bits).unwrap();
            let ts = MAX_TIMESTAMP_DELTA - 7;
            let dc = layout.max_data_center_id();
            let worker = layout.max_worker_id();
            let id = layout.compose(ts, dc, worker, MAX_SEQUENCE);
            assert!(id > 0, "sign bit must stay clear");

            let decoded = layout.decode(id);
            assert_eq!(decoded.timestamp_delta, ts);
            assert_eq!(decoded.data_center_id, dc);
            assert_eq!(decoded.worker_id, worker);
            assert_eq!(decoded.sequence, MAX_SEQUENCE);
        }
    }
}
