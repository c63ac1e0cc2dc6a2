//! datagram-transport: background receive loop for unreliable datagram sockets
//!
//! A [`Listener`] owns one bound socket and a dedicated receive thread. Every datagram is decoded
//! to text and written into a single-slot [`Mailbox`]; the consumer polls the newest message from
//! its own thread at its own pace and anything it did not pick up in time is overwritten. The
//! default build enables a `mock` backend so the loop can be exercised without a network.

mod types;
pub use types::{ListenerOptions, ListenerState, ListenerStats, RawMessage, StatsSnapshot, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::DatagramSocket;

mod mailbox;
pub use mailbox::Mailbox;

mod udp;
pub use udp::UdpSocketBackend;

mod listener;
pub use listener::Listener;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockSender, MockSocket};

/// Port the handset app sends to unless told otherwise.
pub const DEFAULT_PORT: u16 = 3010;
