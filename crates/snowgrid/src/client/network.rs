//! Worker assignments leased from an external coordination authority.
//!
//! A [`NetworkClient`] identifies the process to the authority, takes the
//! worker it hands out, and keeps asking on a fixed period (the heartbeat).
//! When an answer carries a different worker, the client publishes it and
//! pushes it to every registered generator, each of which swaps in a freshly
//! built encoder.
//!
//! ## Revocation
//!
//! The authority may revoke the process instead of answering with a worker.
//! Revocation is terminal for the client instance: the heartbeat stops,
//! [`CoordinationClient::current_worker`] fails with [`Error::Revoked`], and
//! every generator bound to the client refuses to produce further IDs rather
//! than continuing with a stale worker.
//!
//! ## Lifecycle
//!
//! The heartbeat runs as a Tokio task. It stops on
//! [`CoordinationClient::shutdown`], on revocation, or once the client is
//! dropped. A shut down client no longer renews its lease, so it fails with
//! [`Error::ShutDown`] from then on, like a revoked one.

use crate::{
    ClientKind, CoordinationClient, Error, IdLayout, Reassignable, Result, Worker,
    client::host::{current_user, private_ipv4},
};
use arc_swap::ArcSwapOption;
use core::time::Duration;
use parking_lot::Mutex;
use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Default period between two heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Metadata the authority uses to tell processes apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProcessIdentity {
    /// Private IPv4 address of the host, when one could be resolved.
    pub ip: Option<Ipv4Addr>,
    pub pid: u32,
    pub user: String,
    /// Deployment environment (e.g. `prod`, `staging`).
    pub env: String,
}

impl ProcessIdentity {
    /// Collects the identity of the running process.
    pub fn detect(env: impl Into<String>) -> Self {
        Self {
            ip: private_ipv4().ok(),
            pid: std::process::id(),
            user: current_user(),
            env: env.into(),
        }
    }
}

/// What a heartbeat sends to the authority.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HeartbeatRequest {
    pub identity: ProcessIdentity,
    /// Whether the authority may move this process to another worker to
    /// balance load.
    pub load_balance: bool,
    /// The worker currently held, `None` on the first call.
    pub current: Option<Worker>,
}

/// What the authority answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", tag = "type"))]
pub enum Assignment {
    /// Use this worker. Unvalidated; the client range-checks it against its
    /// layout.
    #[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
    Assigned { data_center_id: u32, worker_id: u32 },
    /// Stop producing IDs.
    Revoked,
}

/// The external service handing out workers.
///
/// The transport is up to the implementation; the client only needs one
/// request/response exchange per heartbeat.
pub trait CoordinationAuthority: Send + Sync + 'static {
    /// Performs one heartbeat.
    ///
    /// # Errors
    ///
    /// Implementations should return [`Error::Authority`] for transport or
    /// server failures. The client keeps its current worker and retries on
    /// the next period.
    fn heartbeat(
        &self,
        request: &HeartbeatRequest,
    ) -> impl Future<Output = Result<Assignment>> + Send;
}

/// Tuning for [`NetworkClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkOptions {
    pub heartbeat_interval: Duration,
    pub load_balance: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            load_balance: true,
        }
    }
}

struct Shared<A> {
    authority: A,
    identity: ProcessIdentity,
    layout: IdLayout,
    load_balance: bool,
    revoked: AtomicBool,
    // ms since the UNIX epoch, 0 until the first successful heartbeat
    last_heartbeat: AtomicU64,
    current: ArcSwapOption<Worker>,
    // held while publishing a worker and pushing it to the generators
    applying: Mutex<()>,
    generators: Mutex<Vec<Weak<dyn Reassignable>>>,
}

/// Coordination client that leases its worker from a
/// [`CoordinationAuthority`] and renews it by heartbeat.
///
/// # Example
///
/// ```
/// use snowgrid::{
///     Assignment, CoordinationAuthority, CoordinationClient, HeartbeatRequest, IdLayout,
///     NetworkClient, NetworkOptions, ProcessIdentity, Result,
/// };
///
/// struct Always7;
/// impl CoordinationAuthority for Always7 {
///     async fn heartbeat(&self, _request: &HeartbeatRequest) -> Result<Assignment> {
///         Ok(Assignment::Assigned { data_center_id: 0, worker_id: 7 })
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let layout = IdLayout::new(5).unwrap();
/// let client = NetworkClient::connect(
///     Always7,
///     ProcessIdentity::detect("test"),
///     layout,
///     NetworkOptions::default(),
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(client.current_worker().unwrap().worker_id(), 7);
/// client.shutdown();
/// # });
/// ```
pub struct NetworkClient<A: CoordinationAuthority> {
    shared: Arc<Shared<A>>,
    shutdown: CancellationToken,
}

impl<A: CoordinationAuthority> NetworkClient<A> {
    /// Performs the first heartbeat, then starts the periodic heartbeat task
    /// on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the first heartbeat fails, is revoked, or hands out a worker
    /// that does not fit `layout`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn connect(
        authority: A,
        identity: ProcessIdentity,
        layout: IdLayout,
        options: NetworkOptions,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            authority,
            identity,
            layout,
            load_balance: options.load_balance,
            revoked: AtomicBool::new(false),
            last_heartbeat: AtomicU64::new(0),
            current: ArcSwapOption::empty(),
            applying: Mutex::new(()),
            generators: Mutex::new(Vec::new()),
        });

        shared.beat().await?;

        let shutdown = CancellationToken::new();
        tokio::spawn(heartbeat_loop(
            Arc::downgrade(&shared),
            options.heartbeat_interval,
            shutdown.clone(),
        ));

        Ok(Self { shared, shutdown })
    }

    /// Runs one heartbeat right away, outside the regular period.
    ///
    /// # Errors
    ///
    /// - see [`NetworkClient::connect`]
    /// - [`Error::ShutDown`] after [`CoordinationClient::shutdown`]
    /// - the error of any generator that could not take the new worker
    pub async fn heartbeat_now(&self) -> Result<()> {
        self.ensure_serving()?;
        self.shared.beat().await
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.shared.identity
    }

    pub fn is_revoked(&self) -> bool {
        self.shared.revoked.load(Ordering::Acquire)
    }

    /// Time of the last successful heartbeat, in ms since the UNIX epoch.
    pub fn last_heartbeat(&self) -> Option<u64> {
        match self.shared.last_heartbeat.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Number of live generators registered with this client.
    pub fn registered(&self) -> usize {
        let mut generators = self.shared.generators.lock();
        generators.retain(|g| g.strong_count() > 0);
        generators.len()
    }
}

impl<A: CoordinationAuthority> CoordinationClient for NetworkClient<A> {
    fn kind(&self) -> ClientKind {
        ClientKind::Network
    }

    fn register_generator(&self, generator: Arc<dyn Reassignable>) -> Result<bool> {
        self.ensure_serving()?;

        // Register before reading the current worker: a reassignment that
        // lands in between either sees this generator or is seen by the read
        // below.
        {
            let weak = Arc::downgrade(&generator);
            let mut generators = self.shared.generators.lock();
            generators.retain(|g| g.strong_count() > 0);
            if !generators.iter().any(|g| g.ptr_eq(&weak)) {
                generators.push(weak);
            }
        }

        let current = self.current_worker()?;
        Ok(generator.bound_worker() == current)
    }

    fn current_worker(&self) -> Result<Worker> {
        self.ensure_serving()?;
        self.shared
            .current
            .load()
            .as_deref()
            .copied()
            .ok_or(Error::WorkerUnassigned)
    }

    fn layout(&self) -> Option<IdLayout> {
        Some(self.shared.layout)
    }

    fn ensure_serving(&self) -> Result<()> {
        if self.is_revoked() {
            return Err(Error::Revoked);
        }
        if self.shutdown.is_cancelled() {
            return Err(Error::ShutDown);
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl<A: CoordinationAuthority> Drop for NetworkClient<A> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<A: CoordinationAuthority> Shared<A> {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self), fields(env = %self.identity.env))
    )]
    async fn beat(&self) -> Result<()> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(Error::Revoked);
        }

        let request = HeartbeatRequest {
            identity: self.identity.clone(),
            load_balance: self.load_balance,
            current: self.current.load().as_deref().copied(),
        };
        let assignment = self.authority.heartbeat(&request).await?;
        self.last_heartbeat.store(
            chrono::Utc::now().timestamp_millis().max(1) as u64,
            Ordering::Release,
        );

        match assignment {
            Assignment::Revoked => {
                self.revoked.store(true, Ordering::Release);
                #[cfg(feature = "tracing")]
                tracing::error!("worker assignment revoked, refusing to generate further ids");
                Err(Error::Revoked)
            }
            Assignment::Assigned {
                data_center_id,
                worker_id,
            } => {
                let worker = Worker::create(data_center_id, worker_id, &self.layout)?;
                self.apply(worker)
            }
        }
    }

    /// Publishes `worker` and pushes it to every generator as one step, so
    /// concurrent heartbeats cannot leave generators behind `current`.
    fn apply(&self, worker: Worker) -> Result<()> {
        let _applying = self.applying.lock();

        let previous = self.current.swap(Some(Arc::new(worker)));
        let previous = previous.as_deref().copied();
        if previous == Some(worker) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::info!(?previous, %worker, "worker assignment changed");
        self.reassign_all(worker)
    }

    /// Reassigns every live generator, returning the first failure. A
    /// generator that fails stops producing IDs on its own.
    fn reassign_all(&self, worker: Worker) -> Result<()> {
        let generators: Vec<_> = {
            let mut generators = self.generators.lock();
            generators.retain(|g| g.strong_count() > 0);
            generators.iter().filter_map(Weak::upgrade).collect()
        };

        let mut outcome = Ok(());
        for generator in generators {
            if let Err(e) = generator.reassign(worker) {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, %worker, "failed to reassign generator");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }
}

async fn heartbeat_loop<A: CoordinationAuthority>(
    shared: Weak<Shared<A>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };

        match shared.beat().await {
            Ok(()) => {}
            Err(Error::Revoked) => break,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "heartbeat failed");
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("heartbeat task stopped");
}
