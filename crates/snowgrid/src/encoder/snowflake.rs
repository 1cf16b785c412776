use core::fmt;
use core::time::Duration;
use parking_lot::{Mutex, MutexGuard};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, IdEncoder, IdLayout, MAX_SEQUENCE, MAX_TIMESTAMP_DELTA, Result, TIMESTAMP_BITS,
    TimeSource, WallClock, Worker,
};

/// Largest backwards clock step (in milliseconds) the encoder waits out
/// instead of failing.
pub const MAX_CLOCK_DRIFT_MS: u64 = 5;

#[derive(Debug, Default)]
struct State {
    sequence: u16,
    last_timestamp: u64,
}

/// A lock-based Snowflake encoder, safe to share across threads.
///
/// Every call to [`next_stamped`] runs one short critical section over the
/// `(sequence, last_timestamp)` pair, so IDs from one instance are strictly
/// increasing across all calling threads.
///
/// ## Clock handling
/// - Same millisecond: the sequence is incremented, masked to 12 bits, and if
///   it wrapped to zero the encoder spins on the clock until the next
///   millisecond and emits sequence `0` there.
/// - Clock behind by at most [`MAX_CLOCK_DRIFT_MS`]: the lock is released for
///   twice the offset, then the clock is re-read once. Still behind fails with
///   [`Error::ClockMovedBackwards`].
/// - Clock behind by more: fails immediately.
///
/// The rollover spin is a tight poll: it trades a core for latency, and is
/// bounded by the one millisecond it waits for.
///
/// [`next_stamped`]: IdEncoder::next_stamped
pub struct SnowflakeEncoder<T = WallClock>
where
    T: TimeSource,
{
    start_time: u64,
    layout: IdLayout,
    worker: Worker,
    state: Mutex<State>,
    time: T,
}

impl<T> SnowflakeEncoder<T>
where
    T: TimeSource,
{
    /// Creates an encoder for `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerIdOutOfRange`] or
    /// [`Error::DataCenterIdOutOfRange`] if `worker` does not fit `layout`.
    ///
    /// # Example
    ///
    /// ```
    /// use snowgrid::{IdEncoder, IdLayout, SnowflakeEncoder, TWITTER_EPOCH, WallClock, Worker};
    ///
    /// let layout = IdLayout::new(5).unwrap();
    /// let worker = Worker::create(1, 2, &layout).unwrap();
    /// let encoder = SnowflakeEncoder::new(TWITTER_EPOCH, layout, worker, WallClock::shared()).unwrap();
    ///
    /// let id = encoder.next().unwrap();
    /// let decoded = layout.decode(id);
    /// assert_eq!(decoded.data_center_id, 1);
    /// assert_eq!(decoded.worker_id, 2);
    /// ```
    pub fn new(start_time: u64, layout: IdLayout, worker: Worker, time: T) -> Result<Self> {
        let worker = worker.validate(&layout)?;
        Ok(Self {
            start_time,
            layout,
            worker,
            state: Mutex::new(State::default()),
            time,
        })
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn next_stamped_locked(&self) -> Result<(i64, u64)> {
        let mut state = self.state.lock();

        let mut now = self.time.current_millis();
        if now < state.last_timestamp {
            now = self.cold_clock_behind(&mut state, now)?;
        }

        let last = state.last_timestamp;
        let (timestamp, sequence) = if now == last {
            let sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if sequence == 0 {
                (self.til_next_millis(last)?, 0)
            } else {
                (now, sequence)
            }
        } else {
            (now, 0)
        };

        let delta = self.delta(timestamp)?;
        state.last_timestamp = timestamp;
        state.sequence = sequence;

        let id = self.layout.compose(
            delta,
            self.worker.data_center_id(),
            self.worker.worker_id(),
            sequence,
        );
        Ok((id, timestamp))
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, state: &mut MutexGuard<'_, State>, now: u64) -> Result<u64> {
        let offset = state.last_timestamp - now;
        if offset > MAX_CLOCK_DRIFT_MS {
            #[cfg(feature = "tracing")]
            tracing::error!(offset, "clock moved backwards beyond tolerated drift");
            return Err(Error::ClockMovedBackwards { offset });
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(offset, "clock moved backwards, waiting for it to catch up");
        MutexGuard::unlocked(state, || {
            std::thread::sleep(Duration::from_millis(offset << 1));
        });

        let now = self.time.current_millis();
        if now < state.last_timestamp {
            let offset = state.last_timestamp - now;
            #[cfg(feature = "tracing")]
            tracing::error!(offset, "clock did not recover from drift");
            return Err(Error::ClockMovedBackwards { offset });
        }
        Ok(now)
    }

    fn til_next_millis(&self, last: u64) -> Result<u64> {
        loop {
            let now = self.time.current_millis();
            if now > last {
                return Ok(now);
            }
            // A regression while spinning would otherwise spin for as long as
            // the clock stays behind.
            if last - now > MAX_CLOCK_DRIFT_MS {
                return Err(Error::ClockMovedBackwards { offset: last - now });
            }
            core::hint::spin_loop();
        }
    }

    fn delta(&self, timestamp: u64) -> Result<u64> {
        let delta = timestamp
            .checked_sub(self.start_time)
            .ok_or(Error::ClockBeforeStartTime {
                now: timestamp,
                start_time: self.start_time,
            })?;
        if delta > MAX_TIMESTAMP_DELTA {
            return Err(Error::TimestampOverflow {
                delta,
                bits: TIMESTAMP_BITS,
            });
        }
        Ok(delta)
    }
}

impl<T> IdEncoder for SnowflakeEncoder<T>
where
    T: TimeSource + Clone + Send + Sync + 'static,
{
    type Time = T;

    fn build(start_time: u64, layout: IdLayout, worker: Worker, time: T) -> Result<Self> {
        Self::new(start_time, layout, worker, time)
    }

    fn start_time(&self) -> u64 {
        self.start_time
    }

    fn layout(&self) -> IdLayout {
        self.layout
    }

    fn worker(&self) -> Worker {
        self.worker
    }

    fn time(&self) -> &T {
        &self.time
    }

    fn next_stamped(&self) -> Result<(i64, u64)> {
        self.next_stamped_locked()
    }
}

impl<T> fmt::Debug for SnowflakeEncoder<T>
where
    T: TimeSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeEncoder")
            .field("start_time", &self.start_time)
            .field("layout", &self.layout)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}
