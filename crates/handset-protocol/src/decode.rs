use crate::{
    ButtonStates, DataPacket, DecodeError, DeviceId, Info, Quat, SessionInfo, TouchPoint,
    Touches, Vec3, MAX_TOUCHES,
};

/// Decode one datagram.
///
/// Never fails: each field group ends up present, absent or invalid, and a bad sub-message only
/// affects its own group. Later sub-messages of a kind overwrite earlier valid ones.
pub fn decode(text: &str) -> DataPacket {
    let mut packet = DataPacket::default();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        // words[0] is the header, words[1..] the colon-separated payload
        let words: Vec<&str> = line.split(':').collect();
        let (code, _version) = parse_header(words.first().copied().unwrap_or_default());
        match code {
            "i" => packet.info.merge(decode_info(&words).into()),
            "q" => packet.rotation.merge(decode_rotation(&words).into()),
            "a" => packet.acceleration.merge(decode_acceleration(&words).into()),
            "t" => packet.touches.merge(decode_touches(&words).into()),
            "b" => packet.buttons.merge(decode_buttons(&words).into()),
            _ => packet.unknown_sub_messages += 1,
        }
    }
    packet
}

/// `<code>[,<version>]`; an unparsable version reads as 0.
fn parse_header(header: &str) -> (&str, i32) {
    let mut parts = header.split(',');
    let code = parts.next().unwrap_or_default().trim();
    let version = parts
        .next()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(0);
    (code, version)
}

fn payload<'a>(words: &[&'a str]) -> Result<&'a str, DecodeError> {
    words.get(1).copied().ok_or(DecodeError::MissingPayload)
}

fn fields(payload: &str) -> Vec<&str> {
    payload.split(',').map(str::trim).collect()
}

fn at_least(fields: &[&str], expected: usize) -> Result<(), DecodeError> {
    if fields.len() < expected {
        return Err(DecodeError::TooFewFields {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_f32(value: &str, field: &'static str) -> Result<f32, DecodeError> {
    let v = value
        .parse::<f32>()
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })?;
    if !v.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }
    Ok(v)
}

fn parse_f64(value: &str, field: &'static str) -> Result<f64, DecodeError> {
    let v = value
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })?;
    if !v.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }
    Ok(v)
}

fn parse_int<T: core::str::FromStr>(value: &str, field: &'static str) -> Result<T, DecodeError> {
    value.parse::<T>().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

// i:<id>,<time>[,<deviceId>,<sessionId>,<sequence>]
fn decode_info(words: &[&str]) -> Result<Info, DecodeError> {
    let f = fields(payload(words)?);
    at_least(&f, 2)?;
    let id = DeviceId(parse_int::<i16>(f[0], "id")?);
    let device_time = parse_f64(f[1], "device_time")?;
    let session = if f.len() >= 5 {
        Some(SessionInfo {
            device_id: f[2].to_string(),
            session_id: f[3].to_string(),
            sequence: parse_int::<i64>(f[4], "sequence")?,
        })
    } else {
        None
    };
    Ok(Info {
        id,
        device_time,
        session,
    })
}

// q:<x>,<y>,<z>,<w>
fn decode_rotation(words: &[&str]) -> Result<Quat, DecodeError> {
    let f = fields(payload(words)?);
    at_least(&f, 4)?;
    if f.len() > 4 {
        return Err(DecodeError::TooManyFields {
            expected: 4,
            found: f.len(),
        });
    }
    Ok(Quat::new(
        parse_f32(f[0], "x")?,
        parse_f32(f[1], "y")?,
        parse_f32(f[2], "z")?,
        parse_f32(f[3], "w")?,
    ))
}

// a:<x>,<y>,<z>
fn decode_acceleration(words: &[&str]) -> Result<Vec3, DecodeError> {
    let f = fields(payload(words)?);
    at_least(&f, 3)?;
    Ok(Vec3::new(
        parse_f32(f[0], "x")?,
        parse_f32(f[1], "y")?,
        parse_f32(f[2], "z")?,
    ))
}

// t:<width>,<height>:<x0,y0 | empty>:<x1,y1 | empty>:...
fn decode_touches(words: &[&str]) -> Result<Touches, DecodeError> {
    let size = fields(payload(words)?);
    at_least(&size, 2)?;
    let width = parse_f32(size[0], "width")?;
    let height = parse_f32(size[1], "height")?;

    let mut points = Vec::with_capacity(words.len().saturating_sub(2).min(MAX_TOUCHES));
    for word in words.iter().skip(2).take(MAX_TOUCHES) {
        if word.trim().is_empty() {
            points.push(TouchPoint::RELEASED);
            continue;
        }
        let xy = fields(word);
        at_least(&xy, 2)?;
        points.push(TouchPoint::pressed_at(
            parse_f32(xy[0], "touch_x")?,
            parse_f32(xy[1], "touch_y")?,
        ));
    }
    Ok(Touches {
        points,
        width,
        height,
    })
}

// b:<volumeUp>,<volumeDown>; anything but "1" reads as released
fn decode_buttons(words: &[&str]) -> Result<ButtonStates, DecodeError> {
    let f = fields(payload(words)?);
    at_least(&f, 2)?;
    Ok(ButtonStates {
        volume_up: f[0] == "1",
        volume_down: f[1] == "1",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Group, Vec2};

    #[test]
    fn test_full_info() {
        let p = decode("i,0:1,5.0,dev1,sess1,1");
        let info = p.info.present().cloned();
        assert_eq!(
            info,
            Some(Info {
                id: DeviceId(1),
                device_time: 5.0,
                session: Some(SessionInfo {
                    device_id: "dev1".into(),
                    session_id: "sess1".into(),
                    sequence: 1,
                }),
            })
        );
        assert_eq!(p.device_id(), Some(DeviceId(1)));
    }

    #[test]
    fn test_short_info_has_no_session() {
        let p = decode("i,1:7,12.5");
        let info = p.info.present().cloned();
        assert_eq!(info.as_ref().map(|i| i.id), Some(DeviceId(7)));
        assert_eq!(info.and_then(|i| i.session), None);

        // three or four fields still count as the short form
        let p = decode("i:7,12.5,dev");
        assert!(p.info.present().is_some_and(|i| i.session.is_none()));
    }

    #[test]
    fn test_info_requires_id_and_time() {
        assert!(decode("i,0:1").info.is_invalid());
        assert!(decode("i,0").info.is_invalid());
        assert!(decode("i,0:x,1.0").info.is_invalid());
        assert!(decode("i,0:1,1.0,dev,sess,notanumber").info.is_invalid());
    }

    #[test]
    fn test_rotation_exact_values() {
        let p = decode("q,0:0.1,-0.2,0.3,0.9");
        assert_eq!(p.rotation.present(), Some(&Quat::new(0.1, -0.2, 0.3, 0.9)));
    }

    #[test]
    fn test_rotation_field_count() {
        assert_eq!(
            decode("q,0:0,0,1").rotation,
            Group::Invalid(DecodeError::TooFewFields {
                expected: 4,
                found: 3
            })
        );
        assert!(decode("q,0:0,0,0,1,5").rotation.is_invalid());
        assert!(decode("q,0:0,0,zero,1").rotation.is_invalid());
        assert!(decode("q,0:0,0,NaN,1").rotation.is_invalid());
    }

    #[test]
    fn test_acceleration_allows_extra_fields() {
        let p = decode("a,0:0.5,-9.8,0.1,42");
        assert_eq!(p.acceleration.present(), Some(&Vec3::new(0.5, -9.8, 0.1)));
        assert!(decode("a,0:0.5,-9.8").acceleration.is_invalid());
    }

    #[test]
    fn test_touches_slots() {
        let p = decode("t,0:1080,1920:10,20::30.5,40");
        let touches = p.touches.present().cloned().unwrap_or_default();
        assert_eq!(touches.width, 1080.0);
        assert_eq!(touches.height, 1920.0);
        assert_eq!(
            touches.points,
            vec![
                TouchPoint::pressed_at(10.0, 20.0),
                TouchPoint::RELEASED,
                TouchPoint::pressed_at(30.5, 40.0),
            ]
        );
        assert_eq!(touches.pressed_count(), 2);
    }

    #[test]
    fn test_touches_without_fingers() {
        let p = decode("t,0:320,480");
        let touches = p.touches.present().cloned().unwrap_or_default();
        assert!(touches.points.is_empty());
        assert_eq!(touches.width, 320.0);
    }

    #[test]
    fn test_touches_capped_at_capacity() {
        let mut msg = String::from("t,0:100,100");
        for i in 0..(MAX_TOUCHES + 4) {
            msg.push_str(&format!(":{i},{i}"));
        }
        let p = decode(&msg);
        let points = p.touches.present().map(|t| t.points.clone()).unwrap_or_default();
        assert_eq!(points.len(), MAX_TOUCHES);
        assert_eq!(points[MAX_TOUCHES - 1].position, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_touches_bad_finger_invalidates_group() {
        assert!(decode("t,0:100,100:1,2:3").touches.is_invalid());
        assert!(decode("t,0:100:1,2").touches.is_invalid());
        assert!(decode("t,0").touches.is_invalid());
    }

    #[test]
    fn test_buttons() {
        let p = decode("b,0:1,0");
        assert_eq!(
            p.buttons.present(),
            Some(&ButtonStates {
                volume_up: true,
                volume_down: false
            })
        );
        let p = decode("b,0:yes,1");
        assert_eq!(
            p.buttons.present(),
            Some(&ButtonStates {
                volume_up: false,
                volume_down: true
            })
        );
        assert!(decode("b,0:1").buttons.is_invalid());
    }

    #[test]
    fn test_batch_merges_groups() {
        let p = decode("i,0:1,5.0,dev1,sess1,1\nq,0:0,0,0,1\na,0:1,2,3\nb,0:0,1");
        assert!(p.info.is_present());
        assert_eq!(p.rotation.present(), Some(&Quat::IDENTITY));
        assert!(p.acceleration.is_present());
        assert!(p.buttons.is_present());
        assert_eq!(p.touches, Group::Absent);
        assert_eq!(p.invalid_groups(), 0);
    }

    #[test]
    fn test_later_sub_message_overwrites() {
        let p = decode("q,0:0,0,0,1\nq,0:1,0,0,0");
        assert_eq!(p.rotation.present(), Some(&Quat::new(1.0, 0.0, 0.0, 0.0)));

        // a broken repeat does not erase the good one
        let p = decode("q,0:0,0,0,1\nq,0:broken");
        assert_eq!(p.rotation.present(), Some(&Quat::IDENTITY));
    }

    #[test]
    fn test_bad_group_does_not_affect_siblings() {
        let p = decode("i,0:2,1.5\nq,0:oops\na,0:1,2,3");
        assert!(p.info.is_present());
        assert!(p.rotation.is_invalid());
        assert!(p.acceleration.is_present());
        assert_eq!(p.invalid_groups(), 1);
    }

    #[test]
    fn test_unknown_codes_and_blank_lines() {
        let p = decode("\n\nz,0:1,2\r\nq:0,0,0,1\r\n");
        assert_eq!(p.unknown_sub_messages, 1);
        assert_eq!(p.rotation.present(), Some(&Quat::IDENTITY));
    }

    #[test]
    fn test_version_is_optional_and_lenient() {
        assert!(decode("q:0,0,0,1").rotation.is_present());
        assert!(decode("q,abc:0,0,0,1").rotation.is_present());
        assert_eq!(parse_header("q,7"), ("q", 7));
        assert_eq!(parse_header("q,abc"), ("q", 0));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode(""), DataPacket::default());
    }

    #[test]
    fn test_packet_serializes() -> anyhow::Result<()> {
        let p = decode("i,0:1,5.0\nq,0:bad");
        let json = serde_json::to_value(&p)?;
        assert_eq!(json["rotation"]["invalid"]["reason"], "invalid_number");
        assert_eq!(json["info"]["present"]["id"], 1);
        Ok(())
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_no_panic_on_arbitrary_text(text in ".{0,256}") {
                let _ = decode(&text);
            }

            #[test]
            fn decode_no_panic_on_protocol_like_text(
                text in "([iqatb](,[0-9]{0,2})?(:[-0-9.,a-z]{0,12}){0,5}\n?){0,6}"
            ) {
                let p = decode(&text);
                prop_assert!(p.invalid_groups() <= 5);
            }

            #[test]
            fn rotation_values_survive_decode(
                x in -1.0f32..1.0, y in -1.0f32..1.0, z in -1.0f32..1.0, w in -1.0f32..1.0,
            ) {
                let p = decode(&format!("q,0:{x},{y},{z},{w}"));
                prop_assert_eq!(p.rotation.present(), Some(&Quat::new(x, y, z, w)));
            }
        }
    }
}
