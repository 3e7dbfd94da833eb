use bytes::{Bytes, BytesMut};

use crate::core::frame::{Frame, FRAME_LEN};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{Message, MessageType};

/// Largest payload the 16-bit `content_length` field can describe
pub const MAX_CONTENT_LENGTH: usize = u16::MAX as usize;

/// A frame header paired with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub frame: Frame,
    pub message: Message,
}

impl Packet {
    /// Build a packet for `message` with sequence 0.
    ///
    /// The header's type and content length are derived from the message.
    pub fn new(message: impl Into<Message>) -> Self {
        Self::with_sequence(message, 0)
    }

    pub fn with_sequence(message: impl Into<Message>, sequence: u16) -> Self {
        let message = message.into();
        let frame = Frame {
            msg_type: message.msg_type().tag(),
            sequence,
            content_length: message.encoded_len().min(MAX_CONTENT_LENGTH) as u16,
        };
        Self { frame, message }
    }

    pub fn msg_type(&self) -> MessageType {
        self.message.msg_type()
    }

    /// Total encoded size: header plus declared content length.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.frame.packet_len()
    }

    /// Serialize header and payload into `dst`.
    ///
    /// The payload is encoded first so the header's content length always
    /// matches the bytes that follow it.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let content_len = self.message.encoded_len();
        if content_len > MAX_CONTENT_LENGTH {
            return Err(ProtocolError::OversizedPacket(FRAME_LEN + content_len));
        }

        dst.reserve(FRAME_LEN + content_len);
        let frame = Frame {
            msg_type: self.message.msg_type().tag(),
            sequence: self.frame.sequence,
            content_length: content_len as u16,
        };
        frame.encode(dst);

        let start = dst.len();
        self.message.encode(dst);
        debug_assert_eq!(dst.len() - start, content_len);
        Ok(())
    }

    /// Serialize to a standalone byte buffer.
    pub fn pack(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_LEN + self.message.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Try to decode one packet from the front of `bytes`.
///
/// - `Ok(None)`: not enough bytes yet for the header or the declared payload.
///   This is the normal incomplete state, not an error.
/// - `Ok(Some((packet, consumed)))`: `consumed == 5 + content_length`.
/// - `Err(UnknownMessageType)`: the header is complete but its tag is not
///   registered. `frame_len` says how many bytes the frame occupies.
/// - `Err(LengthMismatch | DeserializeError)`: the payload does not match its
///   declared length; the stream can't be trusted past this point.
///
/// `bytes` is never modified.
pub fn next_packet(bytes: &[u8]) -> Result<Option<(Packet, usize)>> {
    let frame = match Frame::parse(bytes) {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let total = frame.packet_len();
    if bytes.len() < total {
        return Ok(None);
    }

    let msg_type =
        MessageType::from_tag(frame.msg_type).ok_or(ProtocolError::UnknownMessageType {
            msg_type: frame.msg_type,
            frame_len: total,
        })?;

    let mut content = &bytes[FRAME_LEN..total];
    let message = Message::decode(msg_type, &mut content)?;
    if !content.is_empty() {
        return Err(ProtocolError::LengthMismatch {
            declared: frame.content_length as usize,
            consumed: frame.content_length as usize - content.len(),
        });
    }

    Ok(Some((Packet { frame, message }, total)))
}
