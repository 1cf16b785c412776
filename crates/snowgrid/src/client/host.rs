use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Resolves the private IPv4 address this host routes through.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface, whose address is then read back.
///
/// # Errors
///
/// Returns [`Error::NoPrivateAddress`] if no route exists or the chosen
/// address is not in a private range.
pub fn private_ipv4() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|_| Error::NoPrivateAddress)?;
    socket
        .connect((Ipv4Addr::new(10, 255, 255, 255), 1))
        .map_err(|_| Error::NoPrivateAddress)?;
    match socket.local_addr().map_err(|_| Error::NoPrivateAddress)?.ip() {
        IpAddr::V4(ip) if ip.is_private() => Ok(ip),
        _ => Err(Error::NoPrivateAddress),
    }
}

/// The login name of the user running this process, if the environment
/// exposes one.
#[cfg(feature = "network")]
pub(crate) fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| String::from("unknown"))
}
