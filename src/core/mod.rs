//! # Core Protocol Components
//!
//! Low-level framing, packet encoding/decoding and payload wire format.
//!
//! ## Components
//! - **Frame**: fixed 5-byte header
//! - **Packet**: frame + decoded payload, `next_packet` / `pack`
//! - **Codec**: Tokio codec used as the per-connection accumulation buffer
//! - **Wire**: integer/string/sequence encoding shared by all payloads
//!
//! ## Wire Format
//! ```text
//! [MsgType(1)] [Sequence(2)] [ContentLength(2)] [Payload(N)]
//! ```
//! All multi-byte fields are little-endian. `ContentLength` is 16 bits, so a
//! single packet carries at most 65535 payload bytes; anything above the
//! datagram threshold is split into multipart fragments before sending.

pub mod codec;
pub mod frame;
pub mod packet;
pub mod wire;
