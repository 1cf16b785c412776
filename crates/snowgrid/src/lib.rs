mod client;
mod config;
mod encoder;
mod error;
mod generator;
mod layout;
mod registry;
#[cfg(test)]
mod test_clock;
mod time;
mod worker;

pub use crate::client::*;
pub use crate::config::{
    ClientKind, DEFAULT_WORKER_BITS, FieldOptions, MAX_REGISTRATION_ATTEMPTS, Settings,
};
pub use crate::encoder::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::layout::*;
pub use crate::registry::*;
pub use crate::time::*;
pub use crate::worker::*;
