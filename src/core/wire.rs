//! # Payload Wire Format
//!
//! Encoding rules shared by every message payload:
//!
//! - fixed-width integers in their natural width, little-endian
//! - strings as a `u32` byte-length prefix followed by raw UTF-8
//! - homogeneous sequences as a `u32` element count followed by the elements
//! - nested messages recursively apply the same rules
//!
//! Decoding never panics on short input; it fails with
//! [`ProtocolError::DeserializeError`] instead.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{constants, ProtocolError, Result};

/// Serialize / deserialize / encoded-length contract implemented by every
/// payload type and every field type a payload may contain.
pub trait WireFormat: Sized {
    /// Append the encoded form of `self` to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Decode a value from the front of `buf`, advancing it past the consumed bytes.
    fn decode(buf: &mut &[u8]) -> Result<Self>;

    /// Exact number of bytes [`encode`](WireFormat::encode) will append.
    fn encoded_len(&self) -> usize;
}

#[inline]
fn ensure(buf: &&[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ProtocolError::DeserializeError(format!(
            "{}: need {needed} bytes, {} left",
            constants::ERR_TRUNCATED_PAYLOAD,
            buf.remaining()
        )));
    }
    Ok(())
}

macro_rules! impl_wire_int {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl WireFormat for $ty {
                #[inline]
                fn encode(&self, buf: &mut BytesMut) {
                    buf.$put(*self);
                }

                #[inline]
                fn decode(buf: &mut &[u8]) -> Result<Self> {
                    ensure(buf, std::mem::size_of::<$ty>())?;
                    Ok(buf.$get())
                }

                #[inline]
                fn encoded_len(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_wire_int! {
    u8 => put_u8, get_u8;
    u16 => put_u16_le, get_u16_le;
    u32 => put_u32_le, get_u32_le;
    u64 => put_u64_le, get_u64_le;
    i32 => put_i32_le, get_i32_le;
    i64 => put_i64_le, get_i64_le;
}

/// Read a `u32` length/count prefix.
fn decode_prefix(buf: &mut &[u8]) -> Result<usize> {
    let len = u32::decode(buf)?;
    Ok(len as usize)
}

impl WireFormat for String {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let len = decode_prefix(buf)?;
        ensure(buf, len)?;
        let (head, tail) = buf.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|_| ProtocolError::DeserializeError(constants::ERR_INVALID_UTF8.into()))?
            .to_owned();
        *buf = tail;
        Ok(value)
    }

    fn encoded_len(&self) -> usize {
        4 + self.len()
    }
}

impl<T: WireFormat> WireFormat for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        for item in self {
            item.encode(buf);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let count = decode_prefix(buf)?;
        // A hostile count must not drive the allocation; each element needs
        // at least one byte unless it is empty, so cap by what is left.
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }

    fn encoded_len(&self) -> usize {
        4 + self.iter().map(WireFormat::encoded_len).sum::<usize>()
    }
}
