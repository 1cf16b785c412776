use crate::{Error, IdKind, IdLayout, IdValue, Result, TimeSource, Worker};
use chrono::DateTime;
use num_bigint::BigUint;

/// Width of the zero-padded suffix appended to composite string IDs.
pub const SUFFIX_DIGITS: usize = 5;

/// Suffix numbers are reduced modulo this value before formatting.
pub const SUFFIX_MODULUS: i64 = 100_000;

/// A stateful ID encoder bound to a single start time and [`Worker`].
///
/// Implementations own the bit-packing state machine; the string and big
/// integer representations are derived here from [`IdEncoder::next_stamped`].
/// An encoder is never re-pointed at another worker: a reassignment builds a
/// fresh one through [`IdEncoder::build`].
pub trait IdEncoder: Send + Sync + Sized {
    /// The clock the encoder reads.
    type Time: TimeSource + Clone + Send + Sync + 'static;

    /// Creates an encoder for `worker`, validating it against `layout`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `worker` does not fit `layout`.
    fn build(start_time: u64, layout: IdLayout, worker: Worker, time: Self::Time)
    -> Result<Self>;

    fn start_time(&self) -> u64;

    fn layout(&self) -> IdLayout;

    fn worker(&self) -> Worker;

    fn time(&self) -> &Self::Time;

    /// Generates the next ID together with the absolute timestamp (ms since
    /// the UNIX epoch) it was generated for.
    ///
    /// # Errors
    ///
    /// Fails if the clock regressed beyond the tolerated drift, reads before
    /// the start time, or has outgrown the timestamp field.
    fn next_stamped(&self) -> Result<(i64, u64)>;

    /// Generates the next ID.
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_stamped`].
    fn next(&self) -> Result<i64> {
        self.next_stamped().map(|(id, _)| id)
    }

    /// Generates the next ID as decimal digits.
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_stamped`].
    fn next_as_string(&self) -> Result<String> {
        self.next().map(|id| id.to_string())
    }

    /// Generates a composite ID: `yyyyMMdd` (UTC date of the ID's timestamp),
    /// the decimal ID, then `suffix % 100000` zero-padded to five digits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NegativeSuffix`] before touching any state if
    /// `suffix` is negative, otherwise see [`IdEncoder::next_stamped`].
    fn next_as_string_with_suffix(&self, suffix: i64) -> Result<String> {
        if suffix < 0 {
            return Err(Error::NegativeSuffix(suffix));
        }
        let (id, timestamp) = self.next_stamped()?;
        let date = date_prefix(timestamp, self.start_time())?;
        Ok(format!(
            "{date}{id}{:0width$}",
            suffix % SUFFIX_MODULUS,
            width = SUFFIX_DIGITS
        ))
    }

    /// Numeric value of [`IdEncoder::next_as_string_with_suffix`].
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_as_string_with_suffix`].
    fn next_with_suffix(&self, suffix: i64) -> Result<BigUint> {
        let digits = self.next_as_string_with_suffix(suffix)?;
        BigUint::parse_bytes(digits.as_bytes(), 10).ok_or(Error::InvalidCorrelatedValue(digits))
    }

    /// Generates the next ID in the requested representation.
    ///
    /// `suffix` only applies to [`IdKind::String`] and [`IdKind::BigInteger`];
    /// without one, those kinds carry the plain ID.
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_as_string_with_suffix`].
    fn next_as(&self, kind: IdKind, suffix: Option<i64>) -> Result<IdValue> {
        match (kind, suffix) {
            (IdKind::Integer, _) => self.next().map(IdValue::Integer),
            (IdKind::String, None) => self.next_as_string().map(IdValue::String),
            (IdKind::String, Some(suffix)) => self
                .next_as_string_with_suffix(suffix)
                .map(IdValue::String),
            (IdKind::BigInteger, None) => self
                .next()
                .map(|id| IdValue::BigInteger(BigUint::from(id as u64))),
            (IdKind::BigInteger, Some(suffix)) => {
                self.next_with_suffix(suffix).map(IdValue::BigInteger)
            }
        }
    }
}

fn date_prefix(timestamp: u64, start_time: u64) -> Result<String> {
    i64::try_from(timestamp)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y%m%d").to_string())
        .ok_or(Error::TimestampOverflow {
            delta: timestamp.saturating_sub(start_time),
            bits: crate::TIMESTAMP_BITS,
        })
}
