//! handset-protocol: text wire format spoken by the handset controller app
//!
//! A datagram is a newline-separated batch of sub-messages, each tagged with a method code
//! (`i` info, `q` rotation, `a` acceleration, `t` touches, `b` buttons). [`decode`] folds a batch
//! into one [`DataPacket`] whose field groups are independently present, absent or invalid.
//! [`encode`] renders the same format and backs the simulator and tests.

mod math;
pub use math::{Quat, Vec2, Vec3};

mod error;
pub use error::DecodeError;

mod packet;
pub use packet::{
    Button, ButtonStates, DataPacket, DeviceId, Group, Info, SessionInfo, TouchPoint, Touches,
    MAX_TOUCHES,
};

mod decode;
pub use decode::decode;

mod encode;
pub use encode::{encode, encode_sub_messages, WIRE_VERSION};
