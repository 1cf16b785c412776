use crate::{
    CoordinationClient, Error, IdEncoder, IdKind, IdLayout, IdValue, MAX_REGISTRATION_ATTEMPTS,
    Reassignable, Result, SnowflakeEncoder, Worker, config::validate_start_time,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use core::fmt;
use num_bigint::BigUint;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Hands out IDs from whichever encoder matches the process's current
/// [`Worker`].
///
/// A generator is bound to one [`CoordinationClient`]. At creation it
/// registers with the client and, until the client reports a match, rebuilds
/// its encoder for [`CoordinationClient::current_worker`]. Later
/// reassignments (pushed by the network client) go through the same rebuild.
///
/// Rebuilt encoders keep the generator's original start time and are
/// published with a compare-and-swap: ID producers never take a lock to find
/// the active encoder and always see either the previous one or the new one,
/// fully built. A producer may still finish on the previous encoder for a
/// short window after a change.
///
/// A reassignment that cannot be applied leaves the generator failing with
/// that error until a later reassignment succeeds, so it never keeps minting
/// for a worker the client no longer holds. [`Generator::retire`] stops it
/// for good.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use snowgrid::{FixedClient, Generator, IdLayout, TWITTER_EPOCH, WallClock, Worker};
///
/// let layout = IdLayout::new(5).unwrap();
/// let generator: Arc<Generator> =
///     Generator::new(TWITTER_EPOCH, layout, WallClock::shared(), Arc::new(FixedClient)).unwrap();
///
/// let id = generator.next().unwrap();
/// assert_eq!(generator.worker(), Worker::ZERO);
/// assert_eq!(layout.decode(id).worker_id, 0);
/// ```
pub struct Generator<E = SnowflakeEncoder>
where
    E: IdEncoder + 'static,
{
    start_time: u64,
    layout: IdLayout,
    time: E::Time,
    suffix_from: Option<String>,
    active: ArcSwap<E>,
    fault: ArcSwapOption<Error>,
    client: Arc<dyn CoordinationClient>,
}

impl<E> Generator<E>
where
    E: IdEncoder + 'static,
{
    /// Creates a generator and registers it with `client`.
    ///
    /// # Errors
    ///
    /// - [`Error::StartTimeInFuture`] if `start_time` is ahead of `time`
    /// - [`Error::CoordinationExhausted`] if the encoder still does not match
    ///   the client after [`MAX_REGISTRATION_ATTEMPTS`] rounds
    /// - any error of the client, e.g. [`Error::Revoked`]
    pub fn new(
        start_time: u64,
        layout: IdLayout,
        time: E::Time,
        client: Arc<dyn CoordinationClient>,
    ) -> Result<Arc<Self>> {
        Self::with_suffix_from(start_time, layout, time, client, None)
    }

    /// Like [`Generator::new`], deriving the suffix of string and big integer
    /// IDs from the value of the sibling field `suffix_from`.
    ///
    /// # Errors
    ///
    /// See [`Generator::new`].
    pub fn with_suffix_from(
        start_time: u64,
        layout: IdLayout,
        time: E::Time,
        client: Arc<dyn CoordinationClient>,
        suffix_from: Option<String>,
    ) -> Result<Arc<Self>> {
        validate_start_time(start_time, &time)?;
        let encoder = E::build(start_time, layout, Worker::ZERO, time.clone())?;
        let generator = Arc::new(Self {
            start_time,
            layout,
            time,
            suffix_from,
            active: ArcSwap::from_pointee(encoder),
            fault: ArcSwapOption::empty(),
            client,
        });
        generator.register()?;
        Ok(generator)
    }

    fn register(self: &Arc<Self>) -> Result<()> {
        for _attempt in 1..=MAX_REGISTRATION_ATTEMPTS {
            if self.client.register_generator(self.clone())? {
                return Ok(());
            }
            let worker = self.client.current_worker()?;
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt = _attempt, %worker, "encoder does not match client, rebuilding");
            self.rebuild(worker)?;
        }

        #[cfg(feature = "tracing")]
        tracing::error!(
            attempts = MAX_REGISTRATION_ATTEMPTS,
            "generator failed to converge on the coordinated worker"
        );
        Err(Error::CoordinationExhausted {
            attempts: MAX_REGISTRATION_ATTEMPTS,
        })
    }

    fn rebuild(&self, worker: Worker) -> Result<()> {
        let worker = worker.validate(&self.layout)?;
        for _ in 0..MAX_REGISTRATION_ATTEMPTS {
            let current = self.active.load_full();
            if current.worker() == worker {
                return Ok(());
            }

            let next = Arc::new(E::build(
                self.start_time,
                self.layout,
                worker,
                self.time.clone(),
            )?);
            let previous = self.active.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                #[cfg(feature = "tracing")]
                tracing::info!(from = %current.worker(), to = %worker, "published encoder for new worker");
                return Ok(());
            }
        }

        Err(Error::CoordinationExhausted {
            attempts: MAX_REGISTRATION_ATTEMPTS,
        })
    }

    fn ensure_serving(&self) -> Result<()> {
        if let Some(fault) = self.fault.load().as_deref() {
            return Err(fault.clone());
        }
        self.client.ensure_serving()
    }

    /// Stops the generator: every later `next*` call and reassignment fails
    /// with [`Error::ShutDown`]. Idempotent.
    pub fn retire(&self) {
        self.fault.store(Some(Arc::new(Error::ShutDown)));
    }

    /// Generates the next integer ID.
    ///
    /// # Errors
    ///
    /// - [`Error::Revoked`] once the client was revoked
    /// - [`Error::ShutDown`] once retired or the client was shut down
    /// - the error of the last failed reassignment, until one succeeds
    /// - otherwise see [`IdEncoder::next_stamped`]
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next(&self) -> Result<i64> {
        self.ensure_serving()?;
        self.active.load().next()
    }

    /// Generates the next ID as decimal digits.
    ///
    /// # Errors
    ///
    /// See [`Generator::next`].
    pub fn next_as_string(&self) -> Result<String> {
        self.ensure_serving()?;
        self.active.load().next_as_string()
    }

    /// Generates a composite `yyyyMMdd` + ID + five digit suffix string.
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_as_string_with_suffix`].
    pub fn next_as_string_with_suffix(&self, suffix: i64) -> Result<String> {
        self.ensure_serving()?;
        self.active.load().next_as_string_with_suffix(suffix)
    }

    /// Numeric value of [`Generator::next_as_string_with_suffix`].
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::next_as_string_with_suffix`].
    pub fn next_with_suffix(&self, suffix: i64) -> Result<BigUint> {
        self.ensure_serving()?;
        self.active.load().next_with_suffix(suffix)
    }

    /// Generates the next ID in the requested representation.
    ///
    /// When the generator was configured with a `suffix_from` field, string
    /// and big integer IDs take their suffix from `correlated`, the value of
    /// that field. Otherwise `correlated` is ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCorrelatedValue`] if a suffix is required and
    ///   `correlated` is `None`
    /// - [`Error::InvalidCorrelatedValue`] if `correlated` is not numeric
    /// - see [`Generator::next`]
    pub fn next_value(&self, kind: IdKind, correlated: Option<&IdValue>) -> Result<IdValue> {
        let suffix = match (&self.suffix_from, kind) {
            (Some(field), IdKind::String | IdKind::BigInteger) => Some(
                correlated
                    .ok_or_else(|| Error::MissingCorrelatedValue(field.clone()))?
                    .suffix_number()?,
            ),
            _ => None,
        };

        self.ensure_serving()?;
        self.active.load().next_as(kind, suffix)
    }

    /// A snapshot of the encoder currently in use.
    pub fn encoder(&self) -> Arc<E> {
        self.active.load_full()
    }

    /// The worker the active encoder was built for.
    pub fn worker(&self) -> Worker {
        self.active.load().worker()
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn layout(&self) -> IdLayout {
        self.layout
    }

    pub fn suffix_from(&self) -> Option<&str> {
        self.suffix_from.as_deref()
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }
}

impl<E> Reassignable for Generator<E>
where
    E: IdEncoder + 'static,
{
    fn bound_worker(&self) -> Worker {
        self.worker()
    }

    fn reassign(&self, worker: Worker) -> Result<()> {
        if let Some(Error::ShutDown) = self.fault.load().as_deref() {
            return Err(Error::ShutDown);
        }

        let outcome = self.rebuild(worker);
        self.fault.rcu(|fault| match (fault.as_deref(), &outcome) {
            (Some(Error::ShutDown), _) => fault.clone(),
            (_, Ok(())) => None,
            (_, Err(e)) => Some(Arc::new(e.clone())),
        });

        #[cfg(feature = "tracing")]
        if let Err(e) = &outcome {
            tracing::error!(error = %e, %worker, "reassignment failed, generator stops producing ids");
        }
        outcome
    }
}

impl<E> fmt::Debug for Generator<E>
where
    E: IdEncoder + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("start_time", &self.start_time)
            .field("layout", &self.layout)
            .field("worker", &self.worker())
            .field("suffix_from", &self.suffix_from)
            .field("client", &self.client.kind())
            .finish_non_exhaustive()
    }
}
