use crate::{DecodeError, Quat, Vec2, Vec3};
use core::fmt;
use serde::Serialize;

/// Number of finger slots a touches group can carry.
pub const MAX_TOUCHES: usize = 11;

/// Small integer the handset app is configured with; the registry key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct DeviceId(pub i16);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decode outcome of one field group.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group<T> {
    Absent,
    Invalid(DecodeError),
    Present(T),
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Group::Absent
    }
}

impl<T> Group<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Group::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Group::Present(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Group::Invalid(_))
    }

    /// Fold a later sub-message of the same kind into this group.
    ///
    /// A valid group replaces whatever came before it. An invalid one never displaces a valid one.
    pub(crate) fn merge(&mut self, incoming: Group<T>) {
        match incoming {
            Group::Absent => {}
            Group::Present(_) => *self = incoming,
            Group::Invalid(_) => {
                if !self.is_present() {
                    *self = incoming;
                }
            }
        }
    }
}

impl<T> From<Result<T, DecodeError>> for Group<T> {
    fn from(r: Result<T, DecodeError>) -> Self {
        match r {
            Ok(v) => Group::Present(v),
            Err(e) => Group::Invalid(e),
        }
    }
}

/// Session fields; only sent by app versions that number their packets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub device_id: String,
    pub session_id: String,
    pub sequence: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Info {
    pub id: DeviceId,
    /// Device clock, seconds.
    pub device_time: f64,
    pub session: Option<SessionInfo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TouchPoint {
    pub pressed: bool,
    pub position: Vec2,
}

impl TouchPoint {
    pub const RELEASED: Self = Self {
        pressed: false,
        position: Vec2::ZERO,
    };

    pub fn pressed_at(x: f32, y: f32) -> Self {
        Self {
            pressed: true,
            position: Vec2::new(x, y),
        }
    }
}

/// Finger slots in index order plus the canvas they were measured on.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Touches {
    /// At most [`MAX_TOUCHES`] entries; slots past the end were not reported.
    pub points: Vec<TouchPoint>,
    pub width: f32,
    pub height: f32,
}

impl Touches {
    pub fn pressed_count(&self) -> usize {
        self.points.iter().filter(|p| p.pressed).count()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    VolumeUp,
    VolumeDown,
}

impl Button {
    pub const ALL: [Button; 2] = [Button::VolumeUp, Button::VolumeDown];

    pub fn index(self) -> usize {
        match self {
            Button::VolumeUp => 0,
            Button::VolumeDown => 1,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::VolumeUp => f.write_str("volume-up"),
            Button::VolumeDown => f.write_str("volume-down"),
        }
    }
}

/// Level of every button as reported in one `b` sub-message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ButtonStates {
    pub volume_up: bool,
    pub volume_down: bool,
}

impl ButtonStates {
    pub fn get(&self, button: Button) -> bool {
        match button {
            Button::VolumeUp => self.volume_up,
            Button::VolumeDown => self.volume_down,
        }
    }
}

/// Everything one datagram said, group by group.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DataPacket {
    pub info: Group<Info>,
    pub rotation: Group<Quat>,
    pub acceleration: Group<Vec3>,
    pub touches: Group<Touches>,
    pub buttons: Group<ButtonStates>,
    /// Sub-messages whose method code was not recognised.
    pub unknown_sub_messages: usize,
}

impl DataPacket {
    /// Device the packet is addressed to; `None` without a valid info group.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.info.present().map(|i| i.id)
    }

    pub fn invalid_groups(&self) -> usize {
        [
            self.info.is_invalid(),
            self.rotation.is_invalid(),
            self.acceleration.is_invalid(),
            self.touches.is_invalid(),
            self.buttons.is_invalid(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn with_info(mut self, info: Info) -> Self {
        self.info = Group::Present(info);
        self
    }

    pub fn with_rotation(mut self, q: Quat) -> Self {
        self.rotation = Group::Present(q);
        self
    }

    pub fn with_acceleration(mut self, a: Vec3) -> Self {
        self.acceleration = Group::Present(a);
        self
    }

    pub fn with_touches(mut self, t: Touches) -> Self {
        self.touches = Group::Present(t);
        self
    }

    pub fn with_buttons(mut self, b: ButtonStates) -> Self {
        self.buttons = Group::Present(b);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_valid_over_invalid() {
        let mut g: Group<u8> = Group::Present(1);
        g.merge(Group::Invalid(DecodeError::MissingPayload));
        assert_eq!(g, Group::Present(1));

        g.merge(Group::Present(2));
        assert_eq!(g, Group::Present(2));

        g.merge(Group::Absent);
        assert_eq!(g, Group::Present(2));
    }

    #[test]
    fn test_merge_invalid_into_absent() {
        let mut g: Group<u8> = Group::Absent;
        g.merge(Group::Invalid(DecodeError::MissingPayload));
        assert!(g.is_invalid());
        g.merge(Group::Present(3));
        assert_eq!(g.present(), Some(&3));
    }

    #[test]
    fn test_invalid_group_count() {
        let packet = DataPacket {
            rotation: Group::Invalid(DecodeError::TooFewFields {
                expected: 4,
                found: 3,
            }),
            buttons: Group::Invalid(DecodeError::MissingPayload),
            ..DataPacket::default()
        }
        .with_acceleration(Vec3::ZERO);
        assert_eq!(packet.invalid_groups(), 2);
        assert_eq!(packet.device_id(), None);
    }
}
