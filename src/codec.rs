//! Framing codec for the wire protocol.
//!
//! Implements [`tokio_util::codec::Decoder`]/[`Encoder`] over the
//! `[u32 LE: payload_len + 1][u8: frame_type][payload]` format so transports
//! can be wrapped in `FramedRead`/`FramedWrite` regardless of what byte
//! stream carries them (an SSH child's pipes in production, an in-memory
//! duplex in tests).

// Rust guideline compliant 2026-03

use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{Message, MAX_FRAME_SIZE};

/// Length-prefixed frame codec for [`Message`].
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if length == 0 {
            bail!("zero-length frame");
        }
        if length > MAX_FRAME_SIZE {
            bail!("frame too large: {length} bytes");
        }
        let total = 4 + length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(4);
        let ft = src.get_u8();
        let payload = src.split_to(length as usize - 1);
        Ok(Some(Message::decode(ft, &payload)?))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = BytesMut::new();
        msg.encode_payload(&mut payload);
        dst.reserve(4 + 1 + payload.len());
        dst.put_u32_le(payload.len() as u32 + 1);
        dst.put_u8(msg.frame_type());
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(msgs: &[Message]) -> BytesMut {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for msg in msgs {
            codec.encode(msg.clone(), &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn decodes_multiple_frames_from_one_buffer() {
        let msgs = vec![
            Message::Ready,
            Message::KeyEvent {
                keycode: 55,
                press: true,
            },
            Message::SetClipboard(b"abc".to_vec()),
        ];
        let mut buf = encode_all(&msgs);
        let mut codec = FrameCodec::new();
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(&mut buf).unwrap() {
            out.push(msg);
        }
        assert_eq!(out, msgs);
        assert!(buf.is_empty());
    }

    #[test]
    fn reassembles_across_arbitrary_splits() {
        let msgs = vec![
            Message::MoveRel { dx: 1, dy: -1 },
            Message::SetBrightness(1.0),
            Message::LogMsg("split me".into()),
        ];
        let bytes = encode_all(&msgs);
        // Feed one byte at a time; every frame must still come out intact.
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for b in bytes.iter() {
            buf.put_u8(*b);
            while let Some(msg) = codec.decode(&mut buf).unwrap() {
                out.push(msg);
            }
        }
        assert_eq!(out, msgs);
    }

    #[test]
    fn rejects_zero_length_frame() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert!(FrameCodec::new().decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAX_FRAME_SIZE + 1);
        buf.put_u8(0x02);
        assert!(FrameCodec::new().decode(&mut buf).is_err());
    }

    #[test]
    fn incomplete_frame_returns_none_without_consuming() {
        let bytes = encode_all(&[Message::LogMsg("pending".into())]);
        let mut partial = BytesMut::from(&bytes[..bytes.len() - 1]);
        let mut codec = FrameCodec::new();
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.put_u8(bytes[bytes.len() - 1]);
        assert_eq!(
            codec.decode(&mut partial).unwrap(),
            Some(Message::LogMsg("pending".into()))
        );
    }
}
