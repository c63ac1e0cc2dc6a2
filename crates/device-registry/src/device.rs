use handset_protocol::{Button, DeviceId, Quat, TouchPoint, Vec2, Vec3, MAX_TOUCHES};
use serde::Serialize;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Seconds without an accepted packet before a device counts as disconnected.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maps the handset's sensor frame onto the scene frame.
pub fn axis_remap() -> Quat {
    Quat::from_euler_degrees(0.0, 270.0, 90.0)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonEdge {
    Down,
    Up,
}

/// Level plus the edge produced by the most recent level assignment.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ButtonState {
    pub pressed: bool,
    pub went_down: bool,
    pub went_up: bool,
}

impl ButtonState {
    pub(crate) fn set(&mut self, level: bool) {
        self.went_down = false;
        self.went_up = false;
        if level != self.pressed {
            self.went_down = level;
            self.went_up = !level;
            self.pressed = level;
        }
    }

    pub fn edge(&self, edge: ButtonEdge) -> bool {
        match edge {
            ButtonEdge::Down => self.went_down,
            ButtonEdge::Up => self.went_up,
        }
    }
}

/// One finger slot, double buffered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TouchSlot {
    pub current: TouchPoint,
    pub previous: TouchPoint,
}

impl TouchSlot {
    pub(crate) fn push(&mut self, point: TouchPoint) {
        self.previous = self.current;
        self.current = point;
    }

    /// Position relative to the canvas centre, each axis in `[-0.5, 0.5]` for on-canvas points.
    pub fn normalized(&self, width: f32, height: f32) -> Option<Vec2> {
        if !self.current.pressed || width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Vec2::new(
            self.current.position.x / width - 0.5,
            self.current.position.y / height - 0.5,
        ))
    }
}

/// Borrowed view of a device's touch state.
#[derive(Clone, Copy, Debug)]
pub struct TouchesView<'a> {
    pub slots: &'a [TouchSlot],
    pub width: f32,
    pub height: f32,
    pub count: usize,
}

/// Authoritative state of one handset.
///
/// Every field keeps its last known value until a packet carrying that field group is accepted.
#[derive(Clone, Debug)]
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) device_name: Option<String>,
    pub(crate) session_id: Option<String>,
    pub(crate) last_sequence: Option<i64>,
    pub(crate) device_time: f64,

    pub(crate) connected: bool,
    pub(crate) first_seen: Option<Instant>,
    pub(crate) last_seen: Option<Instant>,
    pub(crate) last_seen_utc: Option<OffsetDateTime>,
    pub(crate) disconnect_timeout: Duration,

    pub(crate) rotation: Quat,
    pub(crate) recenter_offset: Quat,
    pub(crate) acceleration: Vec3,
    pub(crate) buttons: [ButtonState; 2],
    pub(crate) touches: [TouchSlot; MAX_TOUCHES],
    pub(crate) touch_count: usize,
    pub(crate) canvas_width: f32,
    pub(crate) canvas_height: f32,
}

impl Device {
    pub fn new(id: DeviceId) -> Self {
        Self::with_timeout(id, DEFAULT_DISCONNECT_TIMEOUT)
    }

    pub fn with_timeout(id: DeviceId, disconnect_timeout: Duration) -> Self {
        Self {
            id,
            device_name: None,
            session_id: None,
            last_sequence: None,
            device_time: 0.0,
            connected: false,
            first_seen: None,
            last_seen: None,
            last_seen_utc: None,
            disconnect_timeout,
            rotation: Quat::IDENTITY,
            recenter_offset: Quat::IDENTITY,
            acceleration: Vec3::ZERO,
            buttons: [ButtonState::default(); 2],
            touches: [TouchSlot::default(); MAX_TOUCHES],
            touch_count: 0,
            canvas_width: 0.0,
            canvas_height: 0.0,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Identifier string the handset reported about itself.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Sequence number of the last accepted packet in the current session.
    pub fn last_sequence(&self) -> Option<i64> {
        self.last_sequence
    }

    pub fn device_time(&self) -> f64 {
        self.device_time
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn first_seen(&self) -> Option<Instant> {
        self.first_seen
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    pub fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    /// How long the current (or, once disconnected, the last) connection lasted.
    pub fn connected_duration(&self, now: Instant) -> Duration {
        let Some(first) = self.first_seen else {
            return Duration::ZERO;
        };
        if self.connected {
            now.saturating_duration_since(first)
        } else {
            self.last_seen
                .map(|last| last.saturating_duration_since(first))
                .unwrap_or_default()
        }
    }

    /// Last rotation the handset reported, without remap or recentering.
    pub fn raw_rotation(&self) -> Quat {
        self.rotation
    }

    pub fn recenter_offset(&self) -> Quat {
        self.recenter_offset
    }

    /// Orientation for the scene: axis remap, then recenter offset, then raw rotation.
    pub fn orientation(&self) -> Quat {
        axis_remap() * self.recenter_offset * self.rotation
    }

    /// Make the current raw rotation the neutral pose.
    pub fn recenter(&mut self) {
        self.recenter_offset = self.rotation.inverse();
    }

    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    pub fn button(&self, button: Button) -> ButtonState {
        self.buttons[button.index()]
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.button(button).pressed
    }

    pub fn button_edge(&self, button: Button, edge: ButtonEdge) -> bool {
        self.button(button).edge(edge)
    }

    pub fn touches(&self) -> TouchesView<'_> {
        TouchesView {
            slots: &self.touches,
            width: self.canvas_width,
            height: self.canvas_height,
            count: self.touch_count,
        }
    }

    pub fn snapshot(&self, now: Instant) -> DeviceSnapshot {
        let touches = self
            .touches
            .iter()
            .enumerate()
            .filter_map(|(slot, t)| {
                t.normalized(self.canvas_width, self.canvas_height)
                    .map(|position| TouchSnapshot { slot, position })
            })
            .collect();
        DeviceSnapshot {
            id: self.id,
            device_name: self.device_name.clone(),
            session_id: self.session_id.clone(),
            sequence: self.last_sequence,
            connected: self.connected,
            connected_secs: self.connected_duration(now).as_secs_f64(),
            last_seen: self.last_seen_utc.and_then(|t| {
                t.format(&time::format_description::well_known::Rfc3339)
                    .ok()
            }),
            orientation: self.orientation(),
            acceleration: self.acceleration,
            volume_up: self.buttons[Button::VolumeUp.index()],
            volume_down: self.buttons[Button::VolumeDown.index()],
            touch_count: self.touch_count,
            touches,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TouchSnapshot {
    pub slot: usize,
    pub position: Vec2,
}

/// Serializable summary of a device, for operators and logs.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub device_name: Option<String>,
    pub session_id: Option<String>,
    pub sequence: Option<i64>,
    pub connected: bool,
    pub connected_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub orientation: Quat,
    pub acceleration: Vec3,
    pub volume_up: ButtonState,
    pub volume_down: ButtonState,
    pub touch_count: usize,
    pub touches: Vec<TouchSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_edges() {
        let mut b = ButtonState::default();
        b.set(true);
        assert!(b.went_down && !b.went_up && b.pressed);
        b.set(true);
        assert!(!b.went_down && !b.went_up && b.pressed);
        b.set(false);
        assert!(!b.went_down && b.went_up && !b.pressed);
        b.set(false);
        assert_eq!(b, ButtonState::default());
    }

    #[test]
    fn test_touch_slot_normalization() {
        let mut slot = TouchSlot::default();
        assert_eq!(slot.normalized(100.0, 200.0), None);

        slot.push(TouchPoint::pressed_at(75.0, 50.0));
        assert_eq!(slot.normalized(100.0, 200.0), Some(Vec2::new(0.25, -0.25)));
        assert_eq!(slot.normalized(0.0, 200.0), None);
    }

    #[test]
    fn test_fresh_device() {
        let d = Device::new(DeviceId(4));
        assert!(!d.is_connected());
        assert_eq!(d.last_sequence(), None);
        assert_eq!(d.raw_rotation(), Quat::IDENTITY);
        assert!(d.orientation().approx_eq(&axis_remap(), 1e-6));
        assert_eq!(d.connected_duration(Instant::now()), Duration::ZERO);
        assert_eq!(d.touches().slots.len(), MAX_TOUCHES);
        assert_eq!(d.disconnect_timeout(), Duration::from_secs(15));
    }
}
