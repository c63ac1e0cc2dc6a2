use core::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }
}

/// One received datagram, decoded to text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawMessage {
    pub text: String,
    /// Arrival order, starting at 1 for the first datagram a listener thread receives.
    pub seq: u64,
    pub source: SocketAddr,
    pub received_at: Timestamp,
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{seq} from {source} ({len} bytes)",
            seq = self.seq,
            source = self.source,
            len = self.text.len()
        )
    }
}

/// Tuning for the receive loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ListenerOptions {
    /// Upper bound on how long one blocking receive waits; also bounds how long `stop()` waits.
    pub recv_timeout: Duration,
    /// Receive buffer size. Larger datagrams are truncated.
    pub max_datagram_bytes: usize,
    /// Pause after each datagram so a flood cannot pin a core.
    pub yield_interval: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(200),
            max_datagram_bytes: 2048,
            yield_interval: Duration::from_millis(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListenerState {
    /// Never started.
    Idle,
    Running,
    /// Receive loop has exited, either through `stop()` or because the socket closed.
    Stopped,
    /// The last `start` could not bind.
    Failed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerState::Idle => "idle",
            ListenerState::Running => "running",
            ListenerState::Stopped => "stopped",
            ListenerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Counters shared between the receive thread and its consumers.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    superseded: AtomicU64,
    errors: AtomicU64,
}

impl ListenerStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    pub received: u64,
    /// Messages overwritten in the mailbox before anyone polled them.
    pub superseded: u64,
    /// Transport errors other than timeouts and shutdown.
    pub errors: u64,
}
