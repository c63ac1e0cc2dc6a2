use crate::{
    DatagramSocket, ListenerOptions, ListenerState, ListenerStats, Mailbox, RawMessage, Result,
    Timestamp, TransportError, UdpSocketBackend,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Owns a bound socket and the thread that drains it into a [`Mailbox`].
///
/// `poll_latest` is meant to be called from a different thread than the one filling the mailbox,
/// at whatever cadence the consumer runs.
pub struct Listener {
    options: ListenerOptions,
    mailbox: Arc<Mailbox>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    failed: bool,
}

impl Listener {
    pub fn new(options: ListenerOptions) -> Self {
        Self {
            options,
            mailbox: Arc::new(Mailbox::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
            local_addr: None,
            failed: false,
        }
    }

    /// Bind a UDP socket on `addr` and start receiving.
    ///
    /// A bind failure is logged and returned; the listener is left in [`ListenerState::Failed`]
    /// and `stop()` remains safe to call.
    pub fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(TransportError::AlreadyRunning);
        }
        let socket = match UdpSocketBackend::bind(addr) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to bind datagram socket on {addr}: {e}");
                self.failed = true;
                return Err(e);
            }
        };
        self.start_with(socket)?;
        Ok(self.local_addr.unwrap_or(addr))
    }

    /// Start receiving from an already constructed backend.
    pub fn start_with<S>(&mut self, socket: S) -> Result<()>
    where
        S: DatagramSocket + 'static,
    {
        if self.is_running() {
            return Err(TransportError::AlreadyRunning);
        }
        // Reap a loop that ended on its own (closed socket) before starting a new one.
        self.join_worker();

        self.local_addr = socket.local_addr().ok();
        self.stop_flag.store(false, Ordering::Release);

        let mailbox = Arc::clone(&self.mailbox);
        let stop_flag = Arc::clone(&self.stop_flag);
        let options = self.options;
        let handle = thread::Builder::new()
            .name("hs-udp-rx".to_string())
            .spawn(move || receive_loop(socket, mailbox, stop_flag, options))
            .map_err(|e| {
                self.failed = true;
                TransportError::Io(e.to_string())
            })?;

        self.handle = Some(handle);
        self.failed = false;
        match self.local_addr {
            Some(addr) => info!("Listening for datagrams on {addr}"),
            None => info!("Listening for datagrams"),
        }
        Ok(())
    }

    /// Most recent message received since the previous call, if any.
    pub fn poll_latest(&self) -> Option<RawMessage> {
        self.mailbox.take()
    }

    /// Stop the receive loop and release the socket. Idempotent; a no-op if never started.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if self.handle.is_some() {
            self.join_worker();
            info!("Datagram listener stopped");
        }
    }

    pub fn state(&self) -> ListenerState {
        match &self.handle {
            Some(h) if !h.is_finished() => ListenerState::Running,
            Some(_) => ListenerState::Stopped,
            None if self.failed => ListenerState::Failed,
            None if self.local_addr.is_some() => ListenerState::Stopped,
            None => ListenerState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> &ListenerStats {
        self.mailbox.stats()
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Datagram receive thread panicked");
            }
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(ListenerOptions::default())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Minimum pause after a receive error, whatever the configured yield.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

fn error_backoff(options: &ListenerOptions) -> Duration {
    options.yield_interval.max(ERROR_BACKOFF)
}

fn receive_loop<S: DatagramSocket>(
    mut socket: S,
    mailbox: Arc<Mailbox>,
    stop_flag: Arc<AtomicBool>,
    options: ListenerOptions,
) {
    let mut buf = vec![0u8; options.max_datagram_bytes.max(1)];
    let timeout_ms = u64::try_from(options.recv_timeout.as_millis()).unwrap_or(u64::MAX);
    let mut seq = 0u64;

    while !stop_flag.load(Ordering::Acquire) {
        match socket.recv(&mut buf, Some(timeout_ms)) {
            Ok((len, source)) => {
                seq = seq.saturating_add(1);
                let msg = RawMessage {
                    text: String::from_utf8_lossy(&buf[..len]).into_owned(),
                    seq,
                    source,
                    received_at: Timestamp::now(),
                };
                trace!("datagram {msg}");
                if mailbox.put(msg) {
                    trace!("previous datagram superseded before it was polled");
                }
            }
            Err(TransportError::Timeout) => continue,
            Err(TransportError::Closed) => {
                debug!("Datagram socket closed; leaving receive loop");
                break;
            }
            Err(e) => {
                mailbox.stats().record_error();
                warn!("Datagram receive error: {e}");
                // a socket stuck in an error state must not spin the thread
                thread::sleep(error_backoff(&options));
                continue;
            }
        }
        if !options.yield_interval.is_zero() {
            thread::sleep(options.yield_interval);
        }
    }
    debug!("Receive loop exited after {seq} datagrams");
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::MockSocket;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::Instant;

    fn fast_options() -> ListenerOptions {
        ListenerOptions {
            recv_timeout: Duration::from_millis(20),
            max_datagram_bytes: 512,
            yield_interval: Duration::ZERO,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut listener = Listener::new(fast_options());
        assert_eq!(listener.state(), ListenerState::Idle);
        listener.stop();
        listener.stop();
        assert_eq!(listener.state(), ListenerState::Idle);
        assert!(listener.poll_latest().is_none());
    }

    #[test]
    fn test_poll_returns_only_latest() -> anyhow::Result<()> {
        let (socket, sender) = MockSocket::new();
        let mut listener = Listener::new(fast_options());
        listener.start_with(socket)?;
        assert!(listener.is_running());

        sender.send("first")?;
        sender.send("second")?;
        sender.send("third")?;
        assert!(wait_until(|| listener.stats().snapshot().received == 3));

        let latest = listener.poll_latest();
        assert_eq!(latest.as_ref().map(|m| m.text.as_str()), Some("third"));
        assert_eq!(latest.map(|m| m.seq), Some(3));
        assert!(listener.poll_latest().is_none());
        assert_eq!(listener.stats().snapshot().superseded, 2);

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Stopped);
        Ok(())
    }

    #[test]
    fn test_closed_socket_ends_loop() -> anyhow::Result<()> {
        let (socket, sender) = MockSocket::new();
        let mut listener = Listener::new(fast_options());
        listener.start_with(socket)?;
        drop(sender);

        assert!(wait_until(|| listener.state() == ListenerState::Stopped));
        assert_eq!(listener.stats().snapshot().errors, 0);
        listener.stop();
        Ok(())
    }

    #[test]
    fn test_receive_error_is_counted_and_loop_continues() -> anyhow::Result<()> {
        let (socket, sender) = MockSocket::new();
        let mut listener = Listener::new(fast_options());
        listener.start_with(socket)?;

        sender.fail(TransportError::Io("connection reset".into()))?;
        assert!(wait_until(|| listener.stats().snapshot().errors == 1));
        assert!(listener.is_running());

        sender.send("after error")?;
        let mut got = None;
        assert!(wait_until(|| {
            got = listener.poll_latest();
            got.is_some()
        }));
        assert_eq!(got.map(|m| m.text), Some("after error".to_string()));
        assert_eq!(listener.stats().snapshot().errors, 1);

        listener.stop();
        Ok(())
    }

    #[test]
    fn test_error_backoff_has_a_floor() {
        assert_eq!(error_backoff(&fast_options()), ERROR_BACKOFF);
        let slow = ListenerOptions {
            yield_interval: Duration::from_millis(500),
            ..fast_options()
        };
        assert_eq!(error_backoff(&slow), Duration::from_millis(500));
    }

    #[test]
    fn test_second_start_is_rejected() -> anyhow::Result<()> {
        let (socket, _sender) = MockSocket::new();
        let (other, _other_sender) = MockSocket::new();
        let mut listener = Listener::new(fast_options());
        listener.start_with(socket)?;
        assert!(matches!(
            listener.start_with(other),
            Err(TransportError::AlreadyRunning)
        ));
        listener.stop();
        Ok(())
    }

    #[test]
    fn test_bind_failure_leaves_failed_state() -> anyhow::Result<()> {
        let blocker = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        let taken = blocker.local_addr()?;

        let mut listener = Listener::new(fast_options());
        let result = listener.start(taken);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert_eq!(listener.state(), ListenerState::Failed);
        listener.stop();
        Ok(())
    }

    #[test]
    fn test_udp_loopback() -> anyhow::Result<()> {
        let mut listener = Listener::new(fast_options());
        let bound = listener.start(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        client.send_to(b"i,0:1,5.0", bound)?;

        let mut got = None;
        assert!(wait_until(|| {
            got = listener.poll_latest();
            got.is_some()
        }));
        assert_eq!(got.map(|m| m.text), Some("i,0:1,5.0".to_string()));

        listener.stop();
        Ok(())
    }
}
