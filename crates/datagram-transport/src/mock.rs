use crate::{DatagramSocket, Result, TransportError};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

fn mock_peer() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 50_000))
}

/// An in-process socket fed by a [`MockSender`]. Dropping every sender closes the socket.
pub struct MockSocket {
    rx: Receiver<Result<Vec<u8>>>,
    addr: SocketAddr,
}

/// Feeds datagrams into a [`MockSocket`].
#[derive(Clone)]
pub struct MockSender {
    tx: Sender<Result<Vec<u8>>>,
    peer: SocketAddr,
}

impl MockSocket {
    pub fn new() -> (Self, MockSender) {
        let (tx, rx) = mpsc::channel();
        let socket = Self {
            rx,
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, crate::DEFAULT_PORT)),
        };
        let sender = MockSender {
            tx,
            peer: mock_peer(),
        };
        (socket, sender)
    }
}

impl MockSender {
    pub fn send(&self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.tx
            .send(Ok(payload.as_ref().to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    /// Address reported as the sender of every mock datagram.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Make the socket's next `recv` return `err` instead of a datagram.
    pub fn fail(&self, err: TransportError) -> Result<()> {
        self.tx.send(Err(err)).map_err(|_| TransportError::Closed)
    }
}

impl DatagramSocket for MockSocket {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: Option<u64>) -> Result<(usize, SocketAddr)> {
        let payload = match timeout_ms {
            Some(ms) => self
                .rx
                .recv_timeout(Duration::from_millis(ms))
                .map_err(|e| match e {
                    RecvTimeoutError::Timeout => TransportError::Timeout,
                    RecvTimeoutError::Disconnected => TransportError::Closed,
                })?,
            None => self.rx.recv().map_err(|_| TransportError::Closed)?,
        }?;
        // Same truncation rule as a real datagram socket.
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok((n, mock_peer()))
    }
}
