//! UDP socket setup

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

const RECV_BUFFER_SIZE: usize = 256 * 1024;

/// Resolve `bind:port` into a socket address
pub fn parse_bind_addr(bind: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let ip: std::net::IpAddr = bind
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(bind.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Create a blocking UDP socket with `SO_REUSEADDR` and a read timeout
pub fn create_socket(
    bind: &str,
    port: u16,
    read_timeout: Duration,
) -> Result<UdpSocket, NetworkError> {
    let addr = parse_bind_addr(bind, port)?;
    let bind_err = |e: std::io::Error| NetworkError::BindFailed(format!("{addr}: {e}"));

    let socket =
        Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    // Not every platform allows resizing; the default is fine
    let _ = socket.set_recv_buffer_size(RECV_BUFFER_SIZE);
    socket.bind(&addr.into()).map_err(bind_err)?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(read_timeout)).map_err(bind_err)?;
    Ok(socket)
}
