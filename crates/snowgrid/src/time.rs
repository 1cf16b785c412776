use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: u64 = 1_288_834_974_657;

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: u64 = 1_735_689_600_000;

/// A source of millisecond timestamps since the UNIX epoch.
///
/// Encoders only ever read time through this trait, which lets tests drive
/// them with scripted clocks.
///
/// # Example
///
/// ```
/// use snowgrid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since 1970-01-01 UTC.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// Shared ticker thread that updates every millisecond.
#[derive(Debug)]
struct SharedTickerInner {
    current: AtomicU64,
    _handle: OnceLock<JoinHandle<()>>,
}

/// A process-wide wall clock read without syscalls on the hot path.
///
/// A background thread samples `SystemTime::now()` once per millisecond and
/// stores it in a shared atomic; [`current_millis`] is a single relaxed load.
/// Clones share the same ticker, and the thread exits once the last clone is
/// dropped.
///
/// Every [`WallClock::new`] spawns its own thread. Within a process, take
/// [`WallClock::shared`] (or clone one handle) instead.
///
/// The ticker follows the wall clock, so an external adjustment (NTP step,
/// manual change) can make readings go backwards. Detecting that is the
/// encoder's job, not the clock's.
///
/// [`current_millis`]: TimeSource::current_millis
#[derive(Clone, Debug)]
pub struct WallClock {
    inner: Arc<SharedTickerInner>,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock {
    /// The process-wide clock, started on first use and never stopped.
    ///
    /// # Panics
    ///
    /// See [`WallClock::new`].
    pub fn shared() -> Self {
        static SHARED: OnceLock<WallClock> = OnceLock::new();
        SHARED.get_or_init(Self::new).clone()
    }

    /// Starts a new ticker thread.
    ///
    /// # Panics
    ///
    /// Panics if the system clock reads earlier than the UNIX epoch.
    pub fn new() -> Self {
        let inner = Arc::new(SharedTickerInner {
            current: AtomicU64::new(system_millis()),
            _handle: OnceLock::new(),
        });

        let weak_inner = Arc::downgrade(&inner);
        let handle = thread::Builder::new()
            .name("snowgrid-clock".into())
            .spawn(move || {
                let start = Instant::now();
                let mut tick = 0;

                loop {
                    let Some(inner_ref) = weak_inner.upgrade() else {
                        break;
                    };

                    // Absolute target of the next tick, so sleep jitter does
                    // not accumulate
                    let target = start + Duration::from_millis(tick);
                    let now = Instant::now();
                    if now < target {
                        thread::sleep(target - now);
                    }

                    inner_ref.current.store(system_millis(), Ordering::Relaxed);

                    tick = start.elapsed().as_millis() as u64 + 1;
                }
            })
            .expect("failed to spawn clock thread");

        inner
            ._handle
            .set(handle)
            .expect("failed to set thread handle");

        Self { inner }
    }
}

impl TimeSource for WallClock {
    fn current_millis(&self) -> u64 {
        self.inner.current.load(Ordering::Relaxed)
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock before UNIX_EPOCH")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_tracks_system_time() {
        let clock = WallClock::new();
        let before = system_millis();
        thread::sleep(Duration::from_millis(50));
        let ts = clock.current_millis();
        let after = system_millis();

        assert!(ts >= before, "{ts} < {before}");
        assert!(ts <= after, "{ts} > {after}");
    }

    #[test]
    fn shared_handles_reuse_one_ticker() {
        let first = WallClock::shared();
        let second = WallClock::shared();
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert!(!Arc::ptr_eq(&first.inner, &WallClock::new().inner));
        assert!(first.current_millis() > 0);
    }

    #[test]
    fn clones_share_the_ticker() {
        let clock = WallClock::new();
        let other = clock.clone();
        assert!(Arc::ptr_eq(&clock.inner, &other.inner));
    }
}
