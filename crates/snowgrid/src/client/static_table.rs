use crate::{
    ClientKind, CoordinationClient, Error, IdLayout, Reassignable, Result, Worker,
    client::host::private_ipv4,
};
use std::{collections::HashMap, net::Ipv4Addr, sync::Arc};

/// A table of static worker assignments keyed by private IPv4 address.
///
/// # Example
///
/// ```
/// use std::net::Ipv4Addr;
/// use snowgrid::StaticAssignments;
///
/// let table = StaticAssignments::default()
///     .with(Ipv4Addr::new(10, 0, 0, 7), 1, 3);
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StaticAssignments {
    entries: HashMap<Ipv4Addr, Worker>,
}

impl StaticAssignments {
    /// Adds (or replaces) the assignment for `ip`.
    ///
    /// Entries are only range-checked when a client resolves them, since the
    /// layout is not known yet.
    pub fn with(mut self, ip: Ipv4Addr, data_center_id: u32, worker_id: u32) -> Self {
        self.insert(ip, data_center_id, worker_id);
        self
    }

    pub fn insert(&mut self, ip: Ipv4Addr, data_center_id: u32, worker_id: u32) {
        self.entries
            .insert(ip, Worker::from_parts_unchecked(data_center_id, worker_id));
    }

    pub fn get(&self, ip: &Ipv4Addr) -> Option<Worker> {
        self.entries.get(ip).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a JSON object mapping addresses to workers:
    ///
    /// ```json
    /// { "10.0.0.7": { "dataCenterId": 1, "workerId": 3 } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAssignments`] for malformed input.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidAssignments(e.to_string()))
    }
}

/// Worker resolved once, at startup, from a static table.
///
/// The assignment never changes for the lifetime of the client.
#[derive(Clone, Copy, Debug)]
pub struct StaticClient {
    ip: Ipv4Addr,
    worker: Worker,
}

impl StaticClient {
    /// Looks up `ip` in `assignments` and validates the entry against
    /// `layout`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoStaticAssignment`] if the table has no entry for `ip`
    /// - a range error if the entry does not fit `layout`
    pub fn resolve(assignments: &StaticAssignments, ip: Ipv4Addr, layout: &IdLayout) -> Result<Self> {
        let worker = assignments
            .get(&ip)
            .ok_or(Error::NoStaticAssignment { ip })?
            .validate(layout)?;

        #[cfg(feature = "tracing")]
        tracing::info!(%ip, %worker, "resolved static worker assignment");

        Ok(Self { ip, worker })
    }

    /// Like [`StaticClient::resolve`], keyed by this host's private IPv4.
    ///
    /// # Errors
    ///
    /// Additionally returns [`Error::NoPrivateAddress`] if the host address
    /// cannot be determined.
    pub fn for_host(assignments: &StaticAssignments, layout: &IdLayout) -> Result<Self> {
        Self::resolve(assignments, private_ipv4()?, layout)
    }

    pub const fn ip(&self) -> Ipv4Addr {
        self.ip
    }
}

impl CoordinationClient for StaticClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Static
    }

    fn register_generator(&self, generator: Arc<dyn Reassignable>) -> Result<bool> {
        Ok(generator.bound_worker() == self.worker)
    }

    fn current_worker(&self) -> Result<Worker> {
        Ok(self.worker)
    }
}
