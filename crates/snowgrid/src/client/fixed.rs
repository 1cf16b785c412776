use crate::{ClientKind, CoordinationClient, Reassignable, Result, Worker};
use std::sync::Arc;

/// No coordination: every process is [`Worker::ZERO`].
///
/// Only safe when a single process generates IDs for the namespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedClient;

impl CoordinationClient for FixedClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Fixed
    }

    fn register_generator(&self, _generator: Arc<dyn Reassignable>) -> Result<bool> {
        Ok(true)
    }

    fn current_worker(&self) -> Result<Worker> {
        Ok(Worker::ZERO)
    }
}
