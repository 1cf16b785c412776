use crate::{ClientKind, IdLayout, Result, Worker};
use std::sync::Arc;

/// Something whose encoder is bound to a [`Worker`] and can be rebuilt for
/// another one.
///
/// Implemented by [`Generator`]. Coordination clients hold these (weakly, for
/// the network client) so they can push a new worker to every registered
/// generator.
///
/// [`Generator`]: crate::Generator
pub trait Reassignable: Send + Sync {
    /// The worker the currently published encoder was built for.
    fn bound_worker(&self) -> Worker;

    /// Builds an encoder for `worker` and publishes it in place of the
    /// current one. A no-op if the encoder already matches.
    ///
    /// # Errors
    ///
    /// Fails if `worker` does not fit the generator's layout, or if the new
    /// encoder could not be published.
    fn reassign(&self, worker: Worker) -> Result<()>;
}

/// Source of the [`Worker`] assignment for this process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use snowgrid::{CoordinationClient, FixedClient, Worker};
///
/// let client: Arc<dyn CoordinationClient> = Arc::new(FixedClient);
/// assert_eq!(client.current_worker().unwrap(), Worker::ZERO);
/// ```
pub trait CoordinationClient: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> ClientKind;

    /// Binds `generator` to this client and reports whether its encoder
    /// already matches [`CoordinationClient::current_worker`].
    ///
    /// Registering the same generator twice is harmless.
    ///
    /// # Errors
    ///
    /// Fails if the client has no worker yet or has been revoked.
    fn register_generator(&self, generator: Arc<dyn Reassignable>) -> Result<bool>;

    /// The worker this process currently holds.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerUnassigned`] before the first assignment
    /// - [`Error::Revoked`] once the authority revoked this process
    ///
    /// [`Error::WorkerUnassigned`]: crate::Error::WorkerUnassigned
    /// [`Error::Revoked`]: crate::Error::Revoked
    fn current_worker(&self) -> Result<Worker>;

    /// The layout the client validates its workers against, if it keeps
    /// one.
    fn layout(&self) -> Option<IdLayout> {
        None
    }

    /// Checked by generators before every ID. Fails once IDs must no longer
    /// be produced through this client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Revoked`] after revocation and [`Error::ShutDown`]
    /// after a shutdown that left the worker without renewal.
    ///
    /// [`Error::Revoked`]: crate::Error::Revoked
    /// [`Error::ShutDown`]: crate::Error::ShutDown
    fn ensure_serving(&self) -> Result<()> {
        Ok(())
    }

    /// Stops any background work. Idempotent.
    fn shutdown(&self) {}
}
