//! # survival-net
//!
//! UDP transport core for a real-time multiplayer game server.
//!
//! Datagrams arriving on a single socket are demultiplexed by source address
//! into per-connection ring buffers. A message pump per connection decodes the
//! byte stream into typed messages, reassembles multipart fragments and routes
//! each message to the connection manager or the bound game session. Replies go
//! through one outbound queue, where oversized packets are fragmented before
//! being written back to the socket.
//!
//! ## Quick start
//! ```no_run
//! use survival_net::config::NetworkConfig;
//! use survival_net::protocol::payloads::LoginResp;
//! use survival_net::transport::{InboundMessage, UdpServer};
//! use survival_net::Message;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> survival_net::error::Result<()> {
//! let config = NetworkConfig::from_env()?;
//! survival_net::utils::logging::init_logging(&config.logging)?;
//!
//! let (to_manager, mut inbound) = mpsc::channel(config.server.backpressure_limit);
//! let server = UdpServer::bind(config, to_manager).await?;
//! let outbound = server.outbound();
//!
//! tokio::spawn(async move {
//!     while let Some(InboundMessage { peer, message }) = inbound.recv().await {
//!         if let Message::Login(login) = message {
//!             let reply = LoginResp { success: 1, name: login.name, ..Default::default() };
//!             let _ = outbound.send(&peer, reply).await;
//!         }
//!     }
//! });
//!
//! server.run().await
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::core::packet::{next_packet, Packet};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::message::{Message, MessageType};
pub use crate::transport::{InboundMessage, OutboundSender, Peer, UdpServer};
