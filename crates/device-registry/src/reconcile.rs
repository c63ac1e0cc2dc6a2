//! Merging decoded packets into [`Device`] state.
//!
//! Ordering is keyed by (session, sequence). A packet from a new session resets the sequence
//! baseline; within a session a packet whose sequence is not strictly greater than the last
//! accepted one is dropped whole, every field group included, and leaves no trace on the device.
//! Short-form info carries no sequence number at all and is dropped the same way.

use crate::Device;
use core::fmt;
use handset_protocol::{Button, DataPacket, DeviceId};
use serde::Serialize;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Connection state changes, queued for whoever drives the registry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Connected { id: DeviceId },
    Disconnected { id: DeviceId, connected_for: Duration },
}

impl DeviceEvent {
    pub fn device_id(&self) -> DeviceId {
        match self {
            DeviceEvent::Connected { id } | DeviceEvent::Disconnected { id, .. } => *id,
        }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Connected { id } => write!(f, "device {id} connected"),
            DeviceEvent::Disconnected { id, connected_for } => write!(
                f,
                "device {id} disconnected after {:.1}s",
                connected_for.as_secs_f64()
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApplyOutcome {
    Accepted,
    /// Accepted, and the device was not connected before this packet.
    Connected(DeviceEvent),
    /// Sequence number not newer than the last accepted one in this session.
    Stale { sequence: i64, last_accepted: i64 },
    /// Short-form info without session or sequence; it cannot be ordered, so it is dropped.
    Unsequenced,
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApplyOutcome::Accepted | ApplyOutcome::Connected(_))
    }
}

/// Merge `packet` into `device`.
pub fn apply(device: &mut Device, packet: &DataPacket, now: Instant) -> ApplyOutcome {
    if let Some(info) = packet.info.present() {
        let Some(session) = &info.session else {
            return ApplyOutcome::Unsequenced;
        };
        if device.session_id.as_deref() != Some(session.session_id.as_str()) {
            device.session_id = Some(session.session_id.clone());
            device.last_sequence = None;
        }
        // None is the unset sentinel and orders below every sequence number
        if let Some(last) = device.last_sequence {
            if session.sequence <= last {
                return ApplyOutcome::Stale {
                    sequence: session.sequence,
                    last_accepted: last,
                };
            }
        }
        device.last_sequence = Some(session.sequence);
        device.device_name = Some(session.device_id.clone());
        device.device_time = info.device_time;
    }

    if let Some(q) = packet.rotation.present() {
        device.rotation = *q;
    }

    if let Some(a) = packet.acceleration.present() {
        device.acceleration = *a;
    }

    if let Some(levels) = packet.buttons.present() {
        for button in Button::ALL {
            device.buttons[button.index()].set(levels.get(button));
        }
    }

    if let Some(touches) = packet.touches.present() {
        for (slot, point) in device.touches.iter_mut().zip(touches.points.iter()) {
            slot.push(*point);
        }
        device.touch_count = touches.pressed_count();
        device.canvas_width = touches.width;
        device.canvas_height = touches.height;
    }

    device.last_seen = Some(now);
    device.last_seen_utc = Some(OffsetDateTime::now_utc());
    if !device.connected {
        device.first_seen = Some(now);
        device.connected = true;
        return ApplyOutcome::Connected(DeviceEvent::Connected { id: device.id });
    }
    ApplyOutcome::Accepted
}

/// Mark `device` disconnected if it has been silent for longer than its timeout.
pub fn check_timeout(device: &mut Device, now: Instant) -> Option<DeviceEvent> {
    if !device.connected {
        return None;
    }
    let last = device.last_seen?;
    if now.saturating_duration_since(last) <= device.disconnect_timeout {
        return None;
    }
    device.connected = false;
    Some(DeviceEvent::Disconnected {
        id: device.id,
        connected_for: device.connected_duration(now),
    })
}
