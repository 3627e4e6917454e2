//! Wire protocol types and payload encoding.
//!
//! Wire format (shared by master and subordinate sides):
//!
//! ```text
//! [u32 LE: payload_len + 1] [u8: frame_type] [payload_bytes]
//! ```
//!
//! Frame types:
//! - `0x01` `Setup`      — JSON `{version, params}` (master → remote, first frame)
//! - `0x02` `Ready`      — empty (remote → master, completes the handshake)
//! - `0x10` `KeyEvent`   — `[u32 LE keycode][u8 press]`
//! - `0x11` `MoveRel`    — `[i32 LE dx][i32 LE dy]`
//! - `0x12` `ClickEvent` — `[u32 LE button][u8 press]`
//! - `0x13` `SetMousePosScreenRel` — `[f32 LE x][f32 LE y]`, both in [0, 1]
//! - `0x20` `GetClipboard` — empty (request; answered with `SetClipboard`)
//! - `0x21` `SetClipboard` — raw clipboard bytes
//! - `0x30` `SetBrightness` — `[f32 LE level]` in [0, 1]
//! - `0x31` `EdgeMaskChange` — `[u8 old][u8 new][f32 LE x][f32 LE y]`
//! - `0x40` `LogMsg`     — UTF-8 text (remote → master log relay)
//!
//! Numeric payloads are little-endian fixed layout on the hot input path;
//! `Setup` is the one JSON control frame (a flattened parameter map does not
//! warrant a hand-rolled layout). Validation is strict: invalid mask bits,
//! out-of-range floats, and malformed UTF-8 fail the frame, and the
//! connection that sent it.

// Rust guideline compliant 2026-03

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::edge::MASK_ALL;

/// Protocol version carried in `Setup`; mismatches abort the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame payload size. Clipboard transfers bound the realistic
/// payload; anything beyond this is a framing error, not a large message.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Frame type byte constants.
pub mod frame_type {
    /// JSON-encoded [`super::SetupPayload`] (master → remote).
    pub const SETUP: u8 = 0x01;
    /// Handshake completion (remote → master).
    pub const READY: u8 = 0x02;
    /// Key press/release.
    pub const KEY_EVENT: u8 = 0x10;
    /// Relative pointer motion.
    pub const MOVE_REL: u8 = 0x11;
    /// Button press/release.
    pub const CLICK_EVENT: u8 = 0x12;
    /// Absolute screen-relative pointer placement.
    pub const SET_MOUSE_POS_SCREEN_REL: u8 = 0x13;
    /// Clipboard read request.
    pub const GET_CLIPBOARD: u8 = 0x20;
    /// Clipboard contents.
    pub const SET_CLIPBOARD: u8 = 0x21;
    /// Display brightness level.
    pub const SET_BRIGHTNESS: u8 = 0x30;
    /// Edge-mask transition report.
    pub const EDGE_MASK_CHANGE: u8 = 0x31;
    /// Log record relay.
    pub const LOG_MSG: u8 = 0x40;
}

/// `Setup` control payload: protocol version plus the flattened per-remote
/// parameter map from the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPayload {
    /// Protocol version of the sending master.
    pub version: u32,
    /// Key-value parameters for the remote side.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake open (master → remote).
    Setup(SetupPayload),
    /// Handshake completion (remote → master).
    Ready,
    /// Key press (`press == true`) or release.
    KeyEvent {
        /// Platform keycode.
        keycode: u32,
        /// Press or release.
        press: bool,
    },
    /// Relative pointer motion.
    MoveRel {
        /// Horizontal delta.
        dx: i32,
        /// Vertical delta.
        dy: i32,
    },
    /// Button press or release.
    ClickEvent {
        /// Button number.
        button: u32,
        /// Press or release.
        press: bool,
    },
    /// Place the pointer at a screen-relative position, both axes in [0, 1].
    SetMousePosScreenRel {
        /// Horizontal position.
        x: f32,
        /// Vertical position.
        y: f32,
    },
    /// Ask the peer for its clipboard; answered asynchronously with
    /// [`Message::SetClipboard`].
    GetClipboard,
    /// Clipboard contents (raw bytes).
    SetClipboard(Vec<u8>),
    /// Display brightness in [0, 1].
    SetBrightness(f32),
    /// Edge-mask transition on the sender's display.
    EdgeMaskChange {
        /// Previous mask.
        old_mask: u8,
        /// New mask.
        new_mask: u8,
        /// Pointer x in [0, 1] on the sender's screen.
        x: f32,
        /// Pointer y in [0, 1] on the sender's screen.
        y: f32,
    },
    /// Log record from the remote side.
    LogMsg(String),
}

impl Message {
    /// The frame type byte for this message.
    #[must_use]
    pub fn frame_type(&self) -> u8 {
        match self {
            Message::Setup(_) => frame_type::SETUP,
            Message::Ready => frame_type::READY,
            Message::KeyEvent { .. } => frame_type::KEY_EVENT,
            Message::MoveRel { .. } => frame_type::MOVE_REL,
            Message::ClickEvent { .. } => frame_type::CLICK_EVENT,
            Message::SetMousePosScreenRel { .. } => frame_type::SET_MOUSE_POS_SCREEN_REL,
            Message::GetClipboard => frame_type::GET_CLIPBOARD,
            Message::SetClipboard(_) => frame_type::SET_CLIPBOARD,
            Message::SetBrightness(_) => frame_type::SET_BRIGHTNESS,
            Message::EdgeMaskChange { .. } => frame_type::EDGE_MASK_CHANGE,
            Message::LogMsg(_) => frame_type::LOG_MSG,
        }
    }

    /// Append this message's payload bytes to `buf`.
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Message::Setup(setup) => {
                // Serializing a map of strings cannot fail.
                let json = serde_json::to_vec(setup).expect("setup payload serializes");
                buf.put_slice(&json);
            }
            Message::Ready | Message::GetClipboard => {}
            Message::KeyEvent { keycode, press } => {
                buf.put_u32_le(*keycode);
                buf.put_u8(u8::from(*press));
            }
            Message::MoveRel { dx, dy } => {
                buf.put_i32_le(*dx);
                buf.put_i32_le(*dy);
            }
            Message::ClickEvent { button, press } => {
                buf.put_u32_le(*button);
                buf.put_u8(u8::from(*press));
            }
            Message::SetMousePosScreenRel { x, y } => {
                buf.put_f32_le(*x);
                buf.put_f32_le(*y);
            }
            Message::SetClipboard(data) => buf.put_slice(data),
            Message::SetBrightness(level) => buf.put_f32_le(*level),
            Message::EdgeMaskChange {
                old_mask,
                new_mask,
                x,
                y,
            } => {
                buf.put_u8(*old_mask);
                buf.put_u8(*new_mask);
                buf.put_f32_le(*x);
                buf.put_f32_le(*y);
            }
            Message::LogMsg(text) => buf.put_slice(text.as_bytes()),
        }
    }

    /// Decode a payload of the given frame type.
    ///
    /// # Errors
    ///
    /// Fails on unknown frame types, short or overlong payloads, invalid
    /// press flags or mask bits, out-of-range floats, and malformed UTF-8 —
    /// all protocol violations that fail the sending connection.
    pub fn decode(ft: u8, mut payload: &[u8]) -> Result<Message> {
        match ft {
            frame_type::SETUP => {
                let setup: SetupPayload = serde_json::from_slice(payload)
                    .map_err(|e| anyhow!("invalid Setup JSON: {e}"))?;
                Ok(Message::Setup(setup))
            }
            frame_type::READY => {
                expect_len(payload, 0, "Ready")?;
                Ok(Message::Ready)
            }
            frame_type::KEY_EVENT => {
                expect_len(payload, 5, "KeyEvent")?;
                let keycode = payload.get_u32_le();
                let press = press_flag(payload.get_u8(), "KeyEvent")?;
                Ok(Message::KeyEvent { keycode, press })
            }
            frame_type::MOVE_REL => {
                expect_len(payload, 8, "MoveRel")?;
                let dx = payload.get_i32_le();
                let dy = payload.get_i32_le();
                Ok(Message::MoveRel { dx, dy })
            }
            frame_type::CLICK_EVENT => {
                expect_len(payload, 5, "ClickEvent")?;
                let button = payload.get_u32_le();
                let press = press_flag(payload.get_u8(), "ClickEvent")?;
                Ok(Message::ClickEvent { button, press })
            }
            frame_type::SET_MOUSE_POS_SCREEN_REL => {
                expect_len(payload, 8, "SetMousePosScreenRel")?;
                let x = unit_range(payload.get_f32_le(), "SetMousePosScreenRel x")?;
                let y = unit_range(payload.get_f32_le(), "SetMousePosScreenRel y")?;
                Ok(Message::SetMousePosScreenRel { x, y })
            }
            frame_type::GET_CLIPBOARD => {
                expect_len(payload, 0, "GetClipboard")?;
                Ok(Message::GetClipboard)
            }
            frame_type::SET_CLIPBOARD => Ok(Message::SetClipboard(payload.to_vec())),
            frame_type::SET_BRIGHTNESS => {
                expect_len(payload, 4, "SetBrightness")?;
                let level = unit_range(payload.get_f32_le(), "SetBrightness level")?;
                Ok(Message::SetBrightness(level))
            }
            frame_type::EDGE_MASK_CHANGE => {
                expect_len(payload, 10, "EdgeMaskChange")?;
                let old_mask = edge_mask(payload.get_u8(), "EdgeMaskChange old_mask")?;
                let new_mask = edge_mask(payload.get_u8(), "EdgeMaskChange new_mask")?;
                let x = unit_range(payload.get_f32_le(), "EdgeMaskChange x")?;
                let y = unit_range(payload.get_f32_le(), "EdgeMaskChange y")?;
                Ok(Message::EdgeMaskChange {
                    old_mask,
                    new_mask,
                    x,
                    y,
                })
            }
            frame_type::LOG_MSG => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| anyhow!("LogMsg is not UTF-8: {e}"))?;
                Ok(Message::LogMsg(text.to_owned()))
            }
            other => bail!("unknown frame type 0x{other:02x}"),
        }
    }

    /// Short human-readable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Setup(_) => "Setup",
            Message::Ready => "Ready",
            Message::KeyEvent { .. } => "KeyEvent",
            Message::MoveRel { .. } => "MoveRel",
            Message::ClickEvent { .. } => "ClickEvent",
            Message::SetMousePosScreenRel { .. } => "SetMousePosScreenRel",
            Message::GetClipboard => "GetClipboard",
            Message::SetClipboard(_) => "SetClipboard",
            Message::SetBrightness(_) => "SetBrightness",
            Message::EdgeMaskChange { .. } => "EdgeMaskChange",
            Message::LogMsg(_) => "LogMsg",
        }
    }
}

fn expect_len(payload: &[u8], want: usize, kind: &str) -> Result<()> {
    if payload.len() != want {
        bail!(
            "{kind} payload length {} (expected {want})",
            payload.len()
        );
    }
    Ok(())
}

fn press_flag(byte: u8, kind: &str) -> Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => bail!("{kind} press flag 0x{other:02x} (expected 0 or 1)"),
    }
}

fn unit_range(value: f32, what: &str) -> Result<f32> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        bail!("{what} = {value} outside [0, 1]");
    }
    Ok(value)
}

fn edge_mask(mask: u8, what: &str) -> Result<u8> {
    if mask & !MASK_ALL != 0 {
        bail!("{what} 0x{mask:02x} has bits outside the four directions");
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) -> Message {
        let mut buf = BytesMut::new();
        msg.encode_payload(&mut buf);
        Message::decode(msg.frame_type(), &buf).expect("decode")
    }

    #[test]
    fn fixed_layout_messages_roundtrip() {
        for msg in [
            Message::Ready,
            Message::KeyEvent {
                keycode: 0x32,
                press: true,
            },
            Message::MoveRel { dx: -7, dy: 13 },
            Message::ClickEvent {
                button: 3,
                press: false,
            },
            Message::SetMousePosScreenRel { x: 0.0, y: 0.5 },
            Message::GetClipboard,
            Message::SetClipboard(b"hello".to_vec()),
            Message::SetBrightness(0.3),
            Message::EdgeMaskChange {
                old_mask: 0b0010,
                new_mask: 0b0000,
                x: 1.0,
                y: 0.25,
            },
            Message::LogMsg("remote says hi".into()),
        ] {
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn setup_roundtrips_through_json() {
        let mut params = BTreeMap::new();
        params.insert("screen".into(), "HDMI-1".into());
        let msg = Message::Setup(SetupPayload {
            version: PROTOCOL_VERSION,
            params,
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn decode_rejects_unknown_frame_type() {
        assert!(Message::decode(0x7f, &[]).is_err());
    }

    #[test]
    fn decode_rejects_bad_press_flag() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(10);
        buf.put_u8(2);
        assert!(Message::decode(frame_type::KEY_EVENT, &buf).is_err());
    }

    #[test]
    fn decode_rejects_short_payload() {
        assert!(Message::decode(frame_type::MOVE_REL, &[0, 0, 0]).is_err());
        assert!(Message::decode(frame_type::READY, &[1]).is_err());
    }

    #[test]
    fn decode_rejects_invalid_mask_bits() {
        let mut buf = BytesMut::new();
        buf.put_u8(0b0001_0000);
        buf.put_u8(0b0000_0001);
        buf.put_f32_le(0.5);
        buf.put_f32_le(0.5);
        assert!(Message::decode(frame_type::EDGE_MASK_CHANGE, &buf).is_err());
    }

    #[test]
    fn decode_rejects_out_of_range_floats() {
        let mut buf = BytesMut::new();
        buf.put_f32_le(1.5);
        buf.put_f32_le(0.5);
        assert!(Message::decode(frame_type::SET_MOUSE_POS_SCREEN_REL, &buf).is_err());

        let mut buf = BytesMut::new();
        buf.put_f32_le(f32::NAN);
        assert!(Message::decode(frame_type::SET_BRIGHTNESS, &buf).is_err());
    }

    #[test]
    fn decode_rejects_non_utf8_log() {
        assert!(Message::decode(frame_type::LOG_MSG, &[0xff, 0xfe]).is_err());
    }
}
