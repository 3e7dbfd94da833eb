//! Tokio codec over the frame/packet format.
//!
//! The decoder doubles as the per-connection accumulation buffer: bytes read
//! from the ring buffer are appended to a `BytesMut`, and each successful
//! `decode` removes exactly one packet from its front.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::Frame;
use crate::core::packet::{next_packet, Packet};
use crate::error::ProtocolError;

#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    /// Decode one packet from the front of `src`.
    ///
    /// On incomplete input, reserves room for the pending packet's declared
    /// length so the next read can land in place. On an unknown message type
    /// the offending frame is consumed before the error is returned, so the
    /// caller may keep decoding what follows.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match next_packet(&src[..]) {
            Ok(Some((packet, consumed))) => {
                src.advance(consumed);
                Ok(Some(packet))
            }
            Ok(None) => {
                if let Some(frame) = Frame::parse(&src[..]) {
                    src.reserve(frame.packet_len().saturating_sub(src.len()));
                }
                Ok(None)
            }
            Err(ProtocolError::UnknownMessageType {
                msg_type,
                frame_len,
            }) => {
                src.advance(frame_len);
                Err(ProtocolError::UnknownMessageType {
                    msg_type,
                    frame_len,
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}
