use crate::{DatagramSocket, Result, TransportError};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// `std::net::UdpSocket` backend.
pub struct UdpSocketBackend {
    socket: UdpSocket,
    timeout_ms: Option<u64>,
}

impl UdpSocketBackend {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind {
            addr,
            reason: e.to_string(),
        })?;
        Ok(Self {
            socket,
            timeout_ms: None,
        })
    }

    fn apply_timeout(&mut self, timeout_ms: Option<u64>) -> Result<()> {
        if self.timeout_ms == timeout_ms {
            return Ok(());
        }
        // A zero duration is rejected by set_read_timeout; treat it as the smallest wait instead.
        let dur = timeout_ms.map(|ms| Duration::from_millis(ms.max(1)));
        self.socket
            .set_read_timeout(dur)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.timeout_ms = timeout_ms;
        Ok(())
    }
}

impl DatagramSocket for UdpSocketBackend {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: Option<u64>) -> Result<(usize, SocketAddr)> {
        self.apply_timeout(timeout_ms)?;
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(received),
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Err(TransportError::Timeout),
                ErrorKind::NotConnected | ErrorKind::ConnectionAborted => {
                    Err(TransportError::Closed)
                }
                _ => Err(TransportError::Io(e.to_string())),
            },
        }
    }
}
