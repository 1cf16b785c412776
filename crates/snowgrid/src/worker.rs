use crate::{Error, IdLayout, Result};
use core::fmt;

/// The `(data_center_id, worker_id)` coordinate of a producer within the
/// shared ID namespace.
///
/// Workers are plain values: they are never mutated, and two workers with the
/// same IDs are the same worker. When a process is reassigned, a new
/// `Worker` replaces the old one wholesale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Worker {
    data_center_id: u32,
    worker_id: u32,
}

impl Worker {
    /// The worker used when no coordination takes place.
    pub const ZERO: Self = Self {
        data_center_id: 0,
        worker_id: 0,
    };

    /// Creates a worker, range-checking both IDs against `layout`.
    ///
    /// `(0, 0)` always yields [`Worker::ZERO`], which is valid for every
    /// layout.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerIdOutOfRange`] if `worker_id > 2^worker_bits - 1`
    /// - [`Error::DataCenterIdOutOfRange`] if `data_center_id` does not fit
    ///   the remaining bits
    ///
    /// # Example
    ///
    /// ```
    /// use snowgrid::{IdLayout, Worker};
    ///
    /// let layout = IdLayout::new(3).unwrap();
    /// assert!(Worker::create(0, 7, &layout).is_ok());
    /// assert!(Worker::create(0, 8, &layout).is_err());
    /// assert_eq!(Worker::create(0, 0, &layout).unwrap(), Worker::ZERO);
    /// ```
    pub const fn create(data_center_id: u32, worker_id: u32, layout: &IdLayout) -> Result<Self> {
        if data_center_id == 0 && worker_id == 0 {
            return Ok(Self::ZERO);
        }
        if worker_id > layout.max_worker_id() {
            return Err(Error::WorkerIdOutOfRange {
                got: worker_id,
                max: layout.max_worker_id(),
            });
        }
        if data_center_id > layout.max_data_center_id() {
            return Err(Error::DataCenterIdOutOfRange {
                got: data_center_id,
                max: layout.max_data_center_id(),
            });
        }
        Ok(Self {
            data_center_id,
            worker_id,
        })
    }

    /// Builds a worker without range checks. Callers must run
    /// [`Worker::validate`] before an encoder is built for it.
    pub(crate) const fn from_parts_unchecked(data_center_id: u32, worker_id: u32) -> Self {
        Self {
            data_center_id,
            worker_id,
        }
    }

    /// Re-checks this worker against another layout.
    ///
    /// Workers that arrive over the wire (or were built for a different
    /// layout) go through here before an encoder is built for them.
    pub const fn validate(self, layout: &IdLayout) -> Result<Self> {
        Self::create(self.data_center_id, self.worker_id, layout)
    }

    pub const fn data_center_id(&self) -> u32 {
        self.data_center_id
    }

    pub const fn worker_id(&self) -> u32 {
        self.worker_id
    }

    pub const fn is_zero(&self) -> bool {
        self.data_center_id == 0 && self.worker_id == 0
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.data_center_id, self.worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_bounds_follow_worker_bits() {
        for bits in 1..=9 {
            let layout = IdLayout::new(bits).unwrap();
            let max = (1u32 << bits) - 1;
            assert!(Worker::create(0, max, &layout).is_ok());
            assert_eq!(
                Worker::create(0, max + 1, &layout),
                Err(Error::WorkerIdOutOfRange { got: max + 1, max })
            );
        }
    }

    #[test]
    fn data_center_bounds_use_remaining_bits() {
        let layout = IdLayout::new(7).unwrap();
        assert!(Worker::create(7, 0, &layout).is_ok());
        assert_eq!(
            Worker::create(8, 0, &layout),
            Err(Error::DataCenterIdOutOfRange { got: 8, max: 7 })
        );
    }

    #[test]
    fn zero_pair_is_the_shared_sentinel() {
        let layout = IdLayout::new(9).unwrap();
        let worker = Worker::create(0, 0, &layout).unwrap();
        assert_eq!(worker, Worker::ZERO);
        assert!(worker.is_zero());
        assert_eq!(Worker::default(), Worker::ZERO);
    }

    #[test]
    fn validate_rechecks_against_a_narrower_layout() {
        let wide = IdLayout::new(9).unwrap();
        let narrow = IdLayout::new(2).unwrap();
        let worker = Worker::create(1, 300, &wide).unwrap();
        assert!(worker.validate(&wide).is_ok());
        assert!(worker.validate(&narrow).is_err());
    }
}
