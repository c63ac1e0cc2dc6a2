use crate::{ListenerStats, RawMessage};
use std::sync::{Mutex, MutexGuard};

/// Single-slot, last-write-wins hand-off between the receive thread and the consumer.
///
/// The lock is held only for the swap itself. A write always replaces whatever is pending, so a
/// slow consumer sees the freshest datagram and silently loses the ones in between.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<RawMessage>>,
    stats: ListenerStats,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `msg`, dropping any message that was still pending. Returns `true` if one was dropped.
    pub fn put(&self, msg: RawMessage) -> bool {
        self.stats.record_received();
        let superseded = self.lock().replace(msg).is_some();
        if superseded {
            self.stats.record_superseded();
        }
        superseded
    }

    /// Take the pending message, leaving the slot empty. Never blocks on I/O.
    pub fn take(&self) -> Option<RawMessage> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    // A panic while holding the lock cannot leave a half-written Option behind.
    fn lock(&self) -> MutexGuard<'_, Option<RawMessage>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use std::net::{Ipv4Addr, SocketAddr};

    fn msg(seq: u64, text: &str) -> RawMessage {
        RawMessage {
            text: text.to_string(),
            seq,
            source: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            received_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_take_empties_slot() {
        let mailbox = Mailbox::new();
        assert!(mailbox.take().is_none());

        assert!(!mailbox.put(msg(1, "a")));
        assert!(!mailbox.is_empty());
        assert_eq!(mailbox.take().map(|m| m.text), Some("a".to_string()));
        assert!(mailbox.take().is_none());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_newest_message_wins() {
        let mailbox = Mailbox::new();
        mailbox.put(msg(1, "a"));
        assert!(mailbox.put(msg(2, "b")));
        assert!(mailbox.put(msg(3, "c")));

        let latest = mailbox.take();
        assert_eq!(latest.as_ref().map(|m| m.seq), Some(3));
        assert_eq!(latest.map(|m| m.text), Some("c".to_string()));

        let stats = mailbox.stats().snapshot();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.superseded, 2);
    }

    #[test]
    fn test_put_after_take_is_not_superseded() {
        let mailbox = Mailbox::new();
        mailbox.put(msg(1, "a"));
        let _ = mailbox.take();
        assert!(!mailbox.put(msg(2, "b")));
        assert_eq!(mailbox.stats().snapshot().superseded, 0);
    }
}
