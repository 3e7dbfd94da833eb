//! # Error Types
//!
//! Error handling for the transport core.
//!
//! This module defines every error variant that can surface while moving bytes
//! between the UDP socket and the application layer.
//!
//! ## Error Categories
//! - **I/O Errors**: socket failures (fatal for the receive/dispatch workers)
//! - **Decode Errors**: unknown message types, truncated or inconsistent payloads
//! - **Reassembly Errors**: fragments that disagree with their group
//! - **Lifecycle Errors**: closed ring buffers and channels, timeouts
//! - **Configuration Errors**: invalid settings detected at startup
//!
//! "Incomplete data" is deliberately *not* an error: decoders return `Ok(None)`
//! until enough bytes have arrived.
//!
//! ## Example Usage
//! ```rust
//! use survival_net::core::packet::next_packet;
//! use survival_net::error::ProtocolError;
//!
//! // Valid header, but tag 2 is not a registered message type.
//! let bytes = [2u8, 0, 0, 0, 0];
//! match next_packet(&bytes) {
//!     Err(ProtocolError::UnknownMessageType { msg_type, .. }) => assert_eq!(msg_type, 2),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Channel errors
    pub const ERR_MANAGER_GONE: &str = "Connection manager queue closed";
    pub const ERR_OUTBOUND_GONE: &str = "Outbound queue closed";

    /// Decode errors
    pub const ERR_TRUNCATED_PAYLOAD: &str = "Payload ended before all fields were decoded";
    pub const ERR_INVALID_UTF8: &str = "String field is not valid UTF-8";
}

/// ProtocolError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Unknown message type {msg_type} ({frame_len} bytes skipped)")]
    UnknownMessageType { msg_type: u8, frame_len: usize },

    #[error("Content length mismatch: header declared {declared} bytes, payload used {consumed}")]
    LengthMismatch { declared: usize, consumed: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("Fragment group {group_id} expected {expected} parts, got fragment claiming {got}")]
    ReassemblyMismatch { group_id: u32, expected: u16, got: u16 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error means the byte stream can no longer be trusted and the
    /// connection has to be torn down, as opposed to dropping a single message.
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            ProtocolError::DeserializeError(_)
                | ProtocolError::LengthMismatch { .. }
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::Io(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
