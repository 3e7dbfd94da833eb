//! Fixed 5-byte protocol header.
//!
//! ```text
//! [msg_type(1)] [sequence(2, LE)] [content_length(2, LE)] [payload(content_length)]
//! ```

use bytes::{BufMut, BytesMut};
use std::fmt;

/// Size of the encoded frame header in bytes
pub const FRAME_LEN: usize = 5;

/// Protocol header preceding every payload on the wire.
///
/// `sequence` is stamped on send and carried through decode, but nothing
/// consults it for reordering or de-duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub msg_type: u8,
    pub sequence: u16,
    pub content_length: u16,
}

impl Frame {
    pub fn new(msg_type: u8, sequence: u16, content_length: u16) -> Self {
        Self {
            msg_type,
            sequence,
            content_length,
        }
    }

    /// Parse a header from the front of `bytes`.
    ///
    /// Returns `None` when fewer than [`FRAME_LEN`] bytes are available.
    #[inline]
    pub fn parse(bytes: &[u8]) -> Option<Frame> {
        if bytes.len() < FRAME_LEN {
            return None;
        }
        Some(Frame {
            msg_type: bytes[0],
            sequence: u16::from_le_bytes([bytes[1], bytes[2]]),
            content_length: u16::from_le_bytes([bytes[3], bytes[4]]),
        })
    }

    #[inline]
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(FRAME_LEN);
        dst.put_u8(self.msg_type);
        dst.put_u16_le(self.sequence);
        dst.put_u16_le(self.content_length);
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let seq = self.sequence.to_le_bytes();
        let len = self.content_length.to_le_bytes();
        [self.msg_type, seq[0], seq[1], len[0], len[1]]
    }

    /// Header plus declared payload length.
    #[inline]
    pub fn packet_len(&self) -> usize {
        FRAME_LEN + self.content_length as usize
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={} seq={} len={}",
            self.msg_type, self.sequence, self.content_length
        )
    }
}
