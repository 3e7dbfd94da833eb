//! # Protocol Layer
//!
//! The closed message catalogue, payload types, multipart fragmentation and
//! the routing decision applied to every inbound message.

pub mod dispatcher;
pub mod message;
pub mod multipart;
pub mod payloads;

#[cfg(test)]
mod tests;
