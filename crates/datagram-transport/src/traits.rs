use crate::Result;
use std::net::SocketAddr;

/// A minimal blocking datagram socket.
pub trait DatagramSocket: Send {
    /// Address the socket is bound to, if the backend has one.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Receive one datagram into `buf` (blocking with optional timeout in milliseconds).
    ///
    /// Returns the payload length and the sender. A datagram larger than `buf` is truncated.
    /// `TransportError::Timeout` means nothing arrived in time; `TransportError::Closed` means the
    /// socket will never yield data again.
    fn recv(&mut self, buf: &mut [u8], timeout_ms: Option<u64>) -> Result<(usize, SocketAddr)>;
}
