mod fixed;
mod host;
mod interface;
#[cfg(feature = "network")]
mod network;
mod static_table;

pub use fixed::*;
pub use host::private_ipv4;
pub use interface::*;
#[cfg(feature = "network")]
pub use network::*;
pub use static_table::*;
