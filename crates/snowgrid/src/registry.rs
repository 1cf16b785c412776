use crate::{
    ClientKind, CoordinationClient, Error, FieldOptions, FixedClient, Generator, IdEncoder,
    IdLayout, Result, Settings, SnowflakeEncoder, StaticAssignments, StaticClient, TimeSource,
    WallClock, Worker,
};
use core::fmt;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Owns the generators of a process and the coordination client they share.
///
/// The registry replaces process-wide singletons: build one at startup, hand
/// it (or an `Arc` of it) to the code that needs IDs, and call
/// [`Registry::shutdown`] on teardown. Shutdown is terminal: the registry and
/// every generator it handed out fail with [`Error::ShutDown`] afterwards.
///
/// - [`Registry::default_generator`] is created on first use with
///   [`Settings::start_time`].
/// - [`Registry::generator_for`] creates one generator per field name, with
///   optional per-field overrides, and caches it.
///
/// Every generator is registered with the registry's client, so a worker
/// change reaches all of them.
///
/// # Example
///
/// ```
/// use snowgrid::{FieldOptions, IdKind, Registry, Settings, TWITTER_EPOCH};
///
/// let registry = Registry::builder()
///     .settings(Settings::new(TWITTER_EPOCH, 5))
///     .build()
///     .unwrap();
///
/// let id = registry.next_id().unwrap();
/// assert!(id > 0);
///
/// let orders = registry
///     .generator_for("orderId", &FieldOptions::default().with_suffix_from("customerId"))
///     .unwrap();
/// assert_eq!(orders.suffix_from(), Some("customerId"));
/// registry.shutdown();
/// ```
pub struct Registry<E = SnowflakeEncoder>
where
    E: IdEncoder + 'static,
{
    settings: Settings,
    layout: IdLayout,
    time: E::Time,
    client: Arc<dyn CoordinationClient>,
    default: Mutex<Option<Arc<Generator<E>>>>,
    fields: Mutex<HashMap<String, Arc<Generator<E>>>>,
    closed: AtomicBool,
}

impl Registry {
    /// Starts configuring a registry backed by [`SnowflakeEncoder`] and the
    /// [`WallClock`].
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }
}

impl<E> Registry<E>
where
    E: IdEncoder + 'static,
{
    /// Creates a registry around an already built client.
    ///
    /// # Errors
    ///
    /// - a configuration error if `settings` are invalid for `time`
    /// - [`Error::LayoutMismatch`] if `client` validates workers against
    ///   another layout
    pub fn new(settings: Settings, time: E::Time, client: Arc<dyn CoordinationClient>) -> Result<Self> {
        let layout = settings.validate(&time)?;
        if let Some(client_layout) = client.layout() {
            if client_layout != layout {
                return Err(Error::LayoutMismatch {
                    client: client_layout.worker_bits(),
                    settings: layout.worker_bits(),
                });
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            start_time = settings.start_time,
            worker_bits = settings.worker_bits,
            client = ?client.kind(),
            "id registry ready"
        );

        Ok(Self {
            settings,
            layout,
            time,
            client,
            default: Mutex::new(None),
            fields: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The generator for [`Settings::start_time`], created on first use.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ShutDown`] after [`Registry::shutdown`], or if the
    /// generator cannot register with the client. A registration failure is
    /// retried by the next call.
    pub fn default_generator(&self) -> Result<Arc<Generator<E>>> {
        let mut default = self.default.lock();
        self.ensure_open()?;
        if let Some(generator) = default.as_ref() {
            return Ok(generator.clone());
        }

        let generator = Generator::new(
            self.settings.start_time,
            self.layout,
            self.time.clone(),
            self.client.clone(),
        )?;
        *default = Some(generator.clone());
        Ok(generator)
    }

    /// The generator for `field`, created with `options` on first use.
    ///
    /// Options only apply when the generator is created; later calls return
    /// the cached generator unchanged.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ShutDown`] after [`Registry::shutdown`], if the
    /// overridden start time is in the future, or if the generator cannot
    /// register with the client.
    pub fn generator_for(&self, field: &str, options: &FieldOptions) -> Result<Arc<Generator<E>>> {
        let mut fields = self.fields.lock();
        self.ensure_open()?;
        if let Some(generator) = fields.get(field) {
            return Ok(generator.clone());
        }

        let generator = Generator::with_suffix_from(
            options.start_time.unwrap_or(self.settings.start_time),
            self.layout,
            self.time.clone(),
            self.client.clone(),
            options.suffix_from.clone(),
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(field, start_time = generator.start_time(), "created field generator");

        fields.insert(field.to_owned(), generator.clone());
        Ok(generator)
    }

    /// Shorthand for `default_generator()?.next()`.
    ///
    /// # Errors
    ///
    /// See [`Registry::default_generator`] and [`Generator::next`].
    pub fn next_id(&self) -> Result<i64> {
        self.default_generator()?.next()
    }

    /// The worker the client currently holds.
    ///
    /// # Errors
    ///
    /// See [`CoordinationClient::current_worker`].
    pub fn current_worker(&self) -> Result<Worker> {
        self.client.current_worker()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn layout(&self) -> IdLayout {
        self.layout
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ShutDown);
        }
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the client's background work and retires every generator,
    /// including those still held elsewhere. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.client.shutdown();
        if let Some(generator) = self.default.lock().take() {
            generator.retire();
        }
        for (_, generator) in self.fields.lock().drain() {
            generator.retire();
        }

        #[cfg(feature = "tracing")]
        tracing::info!("id registry shut down");
    }
}

impl<E> fmt::Debug for Registry<E>
where
    E: IdEncoder + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("client", &self.client.kind())
            .field("fields", &self.fields.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Registry`].
///
/// The client is picked by [`ClientKind`], once, in [`RegistryBuilder::build`]:
///
/// - [`ClientKind::Fixed`] needs nothing else.
/// - [`ClientKind::Static`] needs a [`StaticAssignments`] table, keyed by
///   [`RegistryBuilder::host_ip`] or else by this host's private IPv4.
/// - [`ClientKind::Network`] needs a connected client passed through
///   [`RegistryBuilder::client`], since the authority is application
///   specific.
#[must_use]
pub struct RegistryBuilder<T = WallClock> {
    settings: Settings,
    clock: T,
    client_kind: ClientKind,
    assignments: StaticAssignments,
    host_ip: Option<Ipv4Addr>,
    client: Option<Arc<dyn CoordinationClient>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            clock: WallClock::shared(),
            client_kind: ClientKind::default(),
            assignments: StaticAssignments::default(),
            host_ip: None,
            client: None,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RegistryBuilder<T>
where
    T: TimeSource + Clone + Send + Sync + 'static,
{
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Reads time from `clock` instead of the shared [`WallClock`].
    pub fn clock<U>(self, clock: U) -> RegistryBuilder<U>
    where
        U: TimeSource + Clone + Send + Sync + 'static,
    {
        RegistryBuilder {
            settings: self.settings,
            clock,
            client_kind: self.client_kind,
            assignments: self.assignments,
            host_ip: self.host_ip,
            client: self.client,
        }
    }

    pub fn client_kind(mut self, kind: ClientKind) -> Self {
        self.client_kind = kind;
        self
    }

    pub fn static_assignments(mut self, assignments: StaticAssignments) -> Self {
        self.assignments = assignments;
        self
    }

    /// Address used to look up the static assignment, instead of detecting
    /// the host's private IPv4.
    pub fn host_ip(mut self, ip: Ipv4Addr) -> Self {
        self.host_ip = Some(ip);
        self
    }

    /// Uses an already built client, overriding
    /// [`RegistryBuilder::client_kind`].
    pub fn client(mut self, client: Arc<dyn CoordinationClient>) -> Self {
        self.client_kind = client.kind();
        self.client = Some(client);
        self
    }

    /// Validates the settings and resolves the client.
    ///
    /// # Errors
    ///
    /// - configuration errors from [`Settings::validate`]
    /// - [`Error::NoStaticAssignment`] or [`Error::NoPrivateAddress`] for a
    ///   static client without a matching entry
    /// - [`Error::MissingAuthority`] for [`ClientKind::Network`] without a
    ///   client
    /// - [`Error::LayoutMismatch`] for a client built with other worker bits
    pub fn build(self) -> Result<Registry<SnowflakeEncoder<T>>> {
        let layout = self.settings.validate(&self.clock)?;

        let client: Arc<dyn CoordinationClient> = match (self.client, self.client_kind) {
            (Some(client), _) => client,
            (None, ClientKind::Fixed) => Arc::new(FixedClient),
            (None, ClientKind::Static) => Arc::new(match self.host_ip {
                Some(ip) => StaticClient::resolve(&self.assignments, ip, &layout)?,
                None => StaticClient::for_host(&self.assignments, &layout)?,
            }),
            (None, ClientKind::Network) => return Err(Error::MissingAuthority),
        };

        Registry::new(self.settings, self.clock, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdKind, IdValue, Reassignable, test_clock::ManualTime};

    const START: u64 = 1_000;

    fn manual(at: u64) -> RegistryBuilder<Arc<ManualTime>> {
        RegistryBuilder::new()
            .settings(Settings::new(START, 5))
            .clock(ManualTime::at(at))
    }

    #[test]
    fn default_generator_is_created_once() {
        let registry = manual(START + 5).build().unwrap();
        let first = registry.default_generator().unwrap();
        let second = registry.default_generator().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.start_time(), START);

        let decoded = registry.layout().decode(registry.next_id().unwrap());
        assert_eq!(decoded.timestamp_delta, 5);
        assert_eq!(registry.current_worker(), Ok(Worker::ZERO));
    }

    #[test]
    fn field_generators_are_cached_with_their_overrides() {
        let registry = manual(START + 500).build().unwrap();
        let options = FieldOptions::default()
            .with_start_time(START + 100)
            .with_suffix_from("accountNo");

        let orders = registry.generator_for("orderId", &options).unwrap();
        assert_eq!(orders.start_time(), START + 100);
        assert_eq!(orders.suffix_from(), Some("accountNo"));

        let again = registry
            .generator_for("orderId", &FieldOptions::default())
            .unwrap();
        assert!(Arc::ptr_eq(&orders, &again));

        let other = registry
            .generator_for("invoiceId", &FieldOptions::default())
            .unwrap();
        assert_eq!(other.start_time(), START);
        assert!(other.suffix_from().is_none());

        let value = orders
            .next_value(IdKind::String, Some(&IdValue::Integer(7)))
            .unwrap();
        assert!(value.to_string().ends_with("00007"));
    }

    #[test]
    fn field_start_time_must_not_be_in_the_future() {
        let registry = manual(START + 10).build().unwrap();
        let options = FieldOptions::default().with_start_time(START + 11);
        assert_eq!(
            registry.generator_for("late", &options).err(),
            Some(Error::StartTimeInFuture {
                start_time: START + 11,
                now: START + 10
            })
        );
    }

    #[test]
    fn build_validates_settings() {
        let err = RegistryBuilder::new()
            .settings(Settings::new(START, 10))
            .clock(ManualTime::at(START))
            .build()
            .err();
        assert_eq!(err, Some(Error::InvalidWorkerBits { got: 10, max: 9 }));

        let err = manual(START - 1).build().err();
        assert!(matches!(err, Some(Error::StartTimeInFuture { .. })));
    }

    #[test]
    fn static_kind_resolves_the_configured_host() {
        let ip = Ipv4Addr::new(10, 4, 0, 2);
        let registry = manual(START)
            .client_kind(ClientKind::Static)
            .static_assignments(StaticAssignments::default().with(ip, 3, 12))
            .host_ip(ip)
            .build()
            .unwrap();

        assert_eq!(registry.client().kind(), ClientKind::Static);
        let generator = registry.default_generator().unwrap();
        assert_eq!(generator.bound_worker(), Worker::create(3, 12, &registry.layout()).unwrap());

        let err = manual(START)
            .client_kind(ClientKind::Static)
            .host_ip(Ipv4Addr::new(10, 4, 0, 3))
            .build()
            .err();
        assert_eq!(
            err,
            Some(Error::NoStaticAssignment {
                ip: Ipv4Addr::new(10, 4, 0, 3)
            })
        );
    }

    #[test]
    fn network_kind_needs_a_client() {
        let err = manual(START).client_kind(ClientKind::Network).build().err();
        assert_eq!(err, Some(Error::MissingAuthority));
    }

    #[test]
    fn shutdown_retires_generators_held_elsewhere() {
        let registry = manual(START + 1).build().unwrap();
        let held = registry.default_generator().unwrap();
        let orders = registry
            .generator_for("orderId", &FieldOptions::default())
            .unwrap();
        assert!(held.next().is_ok());

        registry.shutdown();
        assert!(registry.is_shut_down());

        // Nothing may mint on the same worker and millisecond again.
        assert_eq!(held.next(), Err(Error::ShutDown));
        assert_eq!(orders.next_as_string(), Err(Error::ShutDown));
        assert_eq!(registry.next_id(), Err(Error::ShutDown));
        assert!(matches!(registry.default_generator(), Err(Error::ShutDown)));
        assert!(matches!(
            registry.generator_for("orderId", &FieldOptions::default()),
            Err(Error::ShutDown)
        ));

        registry.shutdown();
    }

    /// Validates workers against a fixed layout, like a connected network
    /// client.
    struct LaidOut(IdLayout);

    impl CoordinationClient for LaidOut {
        fn kind(&self) -> ClientKind {
            ClientKind::Network
        }

        fn register_generator(&self, generator: Arc<dyn Reassignable>) -> Result<bool> {
            Ok(generator.bound_worker() == Worker::ZERO)
        }

        fn current_worker(&self) -> Result<Worker> {
            Ok(Worker::ZERO)
        }

        fn layout(&self) -> Option<IdLayout> {
            Some(self.0)
        }
    }

    #[test]
    fn client_layout_must_match_the_settings() {
        let wide = Arc::new(LaidOut(IdLayout::new(9).unwrap()));
        let err = manual(START).client(wide).build().err();
        assert_eq!(err, Some(Error::LayoutMismatch { client: 9, settings: 5 }));

        let same = Arc::new(LaidOut(IdLayout::new(5).unwrap()));
        let registry = manual(START).client(same).build().unwrap();
        assert_eq!(registry.client().kind(), ClientKind::Network);
    }
}
