use crate::{ButtonStates, DataPacket, Info, Quat, Touches, Vec3};
use std::fmt::Write;

/// Version number written into every sub-message header.
pub const WIRE_VERSION: i32 = 1;

/// Render the present groups of `packet` as one datagram, info first.
pub fn encode(packet: &DataPacket) -> String {
    encode_sub_messages(packet).join("\n")
}

/// One line per present group, in the order the handset app sends them.
pub fn encode_sub_messages(packet: &DataPacket) -> Vec<String> {
    let mut out = Vec::with_capacity(5);
    if let Some(info) = packet.info.present() {
        out.push(encode_info(info));
    }
    if let Some(q) = packet.rotation.present() {
        out.push(encode_rotation(q));
    }
    if let Some(a) = packet.acceleration.present() {
        out.push(encode_acceleration(a));
    }
    if let Some(t) = packet.touches.present() {
        out.push(encode_touches(t));
    }
    if let Some(b) = packet.buttons.present() {
        out.push(encode_buttons(b));
    }
    out
}

fn encode_info(info: &Info) -> String {
    let mut s = format!("i,{WIRE_VERSION}:{},{}", info.id, info.device_time);
    if let Some(session) = &info.session {
        let _ = write!(
            s,
            ",{},{},{}",
            session.device_id, session.session_id, session.sequence
        );
    }
    s
}

fn encode_rotation(q: &Quat) -> String {
    format!("q,{WIRE_VERSION}:{},{},{},{}", q.x, q.y, q.z, q.w)
}

fn encode_acceleration(a: &Vec3) -> String {
    format!("a,{WIRE_VERSION}:{},{},{}", a.x, a.y, a.z)
}

fn encode_touches(t: &Touches) -> String {
    let mut s = format!("t,{WIRE_VERSION}:{},{}", t.width, t.height);
    for p in &t.points {
        s.push(':');
        if p.pressed {
            let _ = write!(s, "{},{}", p.position.x, p.position.y);
        }
    }
    s
}

fn encode_buttons(b: &ButtonStates) -> String {
    let level = |v: bool| if v { '1' } else { '0' };
    format!(
        "b,{WIRE_VERSION}:{},{}",
        level(b.volume_up),
        level(b.volume_down)
    )
}
