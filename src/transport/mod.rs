//! # Transport Layer
//!
//! UDP socket handling and per-connection workers.
//!
//! ## Components
//! - **Server**: receive loop demultiplexing datagrams by source address
//! - **Connection**: per-connection message pump
//! - **Outbound**: bounded outbound queue and the dispatcher that drains it
//! - **Peer**: cloneable connection handle with admin commands
//!
//! ## Dataflow
//! ```text
//! socket → ring buffer → pump → manager / session
//! manager / session → outbound queue → dispatcher → socket
//! ```

pub mod connection;
pub mod outbound;
pub mod peer;
pub mod server;

pub use connection::{Connection, ConnectionState, PumpConfig, PumpLinks};
pub use outbound::{DatagramSink, OutboundDispatcher, OutboundSender, OutgoingMessage};
pub use peer::{AdminMessage, ConnectionId, InboundMessage, Peer};
pub use server::UdpServer;
