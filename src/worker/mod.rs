//! Receiver/sender worker loops driving the core against a real socket.

use std::net::UdpSocket;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::Result;

/// Receiver worker loop: drains the socket, demultiplexes, routes.
pub mod receiver;

/// Sender worker loop: drains transmission queues and the ACK buffer, emits
/// datagrams.
pub mod sender;

/// Binds a non-blocking-with-timeout UDP socket suitable for a worker loop:
/// `socket_read_timeout` bounds how long a blocking `recv_from` can delay
/// observing the session's stop flag.
pub fn bind_socket(bind_addr: std::net::SocketAddr, config: &SessionConfig) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(bind_addr).map_err(|e| {
        crate::error::LockstepError::Invariant(format!("failed to bind {bind_addr}: {e}"))
    })?;
    socket
        .set_read_timeout(Some(config.socket_read_timeout))
        .map_err(|e| {
            crate::error::LockstepError::Invariant(format!("failed to set read timeout: {e}"))
        })?;
    Ok(socket)
}

pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

pub(crate) const fn default_retry_sleep() -> Duration {
    Duration::from_millis(5)
}
