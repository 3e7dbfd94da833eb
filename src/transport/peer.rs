//! Handle to one remote client, shared by the server, its pump, the outbound
//! dispatcher and the application.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;

/// Connection identifier, unique for the lifetime of one server.
pub type ConnectionId = u64;

/// A decoded message together with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub peer: Peer,
    pub message: Message,
}

/// Side-channel commands for a running pump.
#[derive(Debug)]
pub enum AdminMessage {
    /// Route in-game traffic to this session queue from now on
    BindSession(mpsc::Sender<InboundMessage>),
    /// Stop routing in-game traffic; it is dropped until a new bind
    UnbindSession,
    /// Close the connection
    Disconnect,
}

#[derive(Debug)]
struct PeerInner {
    id: ConnectionId,
    addr: SocketAddr,
    admin: mpsc::Sender<AdminMessage>,
    sequence: AtomicU16,
    group_id: AtomicU32,
}

/// Cheap, cloneable handle to a connection.
///
/// Two handles are equal when they refer to the same connection id.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Peer {
    /// Create a handle plus the receiving end of its admin channel.
    pub fn channel(
        id: ConnectionId,
        addr: SocketAddr,
        admin_capacity: usize,
    ) -> (Self, mpsc::Receiver<AdminMessage>) {
        let (admin, admin_rx) = mpsc::channel(admin_capacity.max(1));
        let peer = Self {
            inner: Arc::new(PeerInner {
                id,
                addr,
                admin,
                sequence: AtomicU16::new(0),
                group_id: AtomicU32::new(0),
            }),
        };
        (peer, admin_rx)
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Next outbound sequence number. Wraps at `u16::MAX`.
    pub fn next_sequence(&self) -> u16 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Next fragmentation group id. Wraps at `u32::MAX`.
    pub fn next_group_id(&self) -> u32 {
        self.inner.group_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn bind_session(&self, session: mpsc::Sender<InboundMessage>) -> Result<()> {
        self.admin(AdminMessage::BindSession(session)).await
    }

    pub async fn unbind_session(&self) -> Result<()> {
        self.admin(AdminMessage::UnbindSession).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.admin(AdminMessage::Disconnect).await
    }

    /// `ConnectionClosed` once the pump has exited.
    async fn admin(&self, msg: AdminMessage) -> Result<()> {
        self.inner
            .admin
            .send(msg)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Peer {}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .finish()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.inner.id, self.inner.addr)
    }
}
