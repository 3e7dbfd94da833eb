//! Outbound queue and the single worker that drains it onto the socket.
//!
//! Every message is stamped with its destination's next sequence number and
//! packed. Packed packets larger than `max_datagram_size` are split into
//! multipart fragments, each sent as its own datagram.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, instrument, trace, warn};

use crate::config::TransportConfig;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::protocol::multipart::{split_payload, FRAGMENT_OVERHEAD};
use crate::transport::peer::Peer;
use crate::utils::metrics::Metrics;

/// Where encoded datagrams are written. The UDP socket in production.
#[async_trait]
pub trait DatagramSink: Send + Sync + 'static {
    async fn send_datagram(&self, to: SocketAddr, datagram: &[u8]) -> io::Result<usize>;
}

#[async_trait]
impl DatagramSink for UdpSocket {
    async fn send_datagram(&self, to: SocketAddr, datagram: &[u8]) -> io::Result<usize> {
        self.send_to(datagram, to).await
    }
}

/// A message waiting to be sent to `dest`.
#[derive(Debug)]
pub struct OutgoingMessage {
    pub dest: Peer,
    pub message: Message,
}

/// Cloneable producer side of the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutgoingMessage>,
}

impl OutboundSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue `message` for `dest`, waiting while the queue is full.
    pub async fn send(&self, dest: &Peer, message: impl Into<Message>) -> Result<()> {
        self.tx
            .send(OutgoingMessage {
                dest: dest.clone(),
                message: message.into(),
            })
            .await
            .map_err(|_| ProtocolError::ChannelClosed(constants::ERR_OUTBOUND_GONE))
    }

    /// Queue without waiting. `Ok(false)` if the queue is full.
    pub fn try_send(&self, dest: &Peer, message: impl Into<Message>) -> Result<bool> {
        match self.tx.try_send(OutgoingMessage {
            dest: dest.clone(),
            message: message.into(),
        }) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => {
                Err(ProtocolError::ChannelClosed(constants::ERR_OUTBOUND_GONE))
            }
        }
    }
}

/// Turn one outgoing message into the datagrams that carry it.
///
/// # Errors
/// `OversizedPacket` if the payload can't be described by a 16-bit content
/// length; `InvalidFragment` if `max_datagram_size` leaves no room for
/// fragment content.
pub fn encode_datagrams(
    dest: &Peer,
    message: Message,
    max_datagram_size: usize,
) -> Result<Vec<Bytes>> {
    let packed = Packet::with_sequence(message, dest.next_sequence()).pack()?;
    if packed.len() <= max_datagram_size {
        return Ok(vec![packed]);
    }

    let max_chunk = max_datagram_size.saturating_sub(FRAGMENT_OVERHEAD);
    split_payload(&packed, max_chunk, dest.next_group_id())?
        .into_iter()
        .map(|fragment| Packet::with_sequence(fragment, dest.next_sequence()).pack())
        .collect()
}

pub struct OutboundDispatcher {
    rx: mpsc::Receiver<OutgoingMessage>,
    sink: Arc<dyn DatagramSink>,
    max_datagram_size: usize,
    metrics: Arc<Metrics>,
}

impl OutboundDispatcher {
    pub fn new(
        rx: mpsc::Receiver<OutgoingMessage>,
        sink: Arc<dyn DatagramSink>,
        config: &TransportConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            rx,
            sink,
            max_datagram_size: config.max_datagram_size,
            metrics,
        }
    }

    /// Drain the queue until every sender is gone or `shutdown` fires.
    ///
    /// On shutdown, messages already queued are still sent.
    #[instrument(name = "outbound", skip_all)]
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(out) => self.dispatch(out).await,
                    None => {
                        debug!("outbound queue closed");
                        return;
                    }
                },
                _ = shutdown.recv() => {
                    while let Ok(out) = self.rx.try_recv() {
                        self.dispatch(out).await;
                    }
                    debug!("outbound dispatcher stopped");
                    return;
                }
            }
        }
    }

    /// Encode and send one message. Failures are logged and counted.
    pub async fn dispatch(&self, out: OutgoingMessage) {
        let OutgoingMessage { dest, message } = out;
        let msg_type = message.msg_type();

        let datagrams = match encode_datagrams(&dest, message, self.max_datagram_size) {
            Ok(datagrams) => datagrams,
            Err(e) => {
                warn!(peer = %dest, ?msg_type, error = %e, "dropping unencodable message");
                self.metrics.protocol_error();
                return;
            }
        };

        if datagrams.len() > 1 {
            trace!(peer = %dest, ?msg_type, fragments = datagrams.len(), "fragmented");
            self.metrics.fragments_sent(datagrams.len() as u64);
        }

        for datagram in &datagrams {
            match self.sink.send_datagram(dest.addr(), datagram).await {
                Ok(n) => self.metrics.datagram_sent(n as u64),
                Err(e) => {
                    warn!(peer = %dest, ?msg_type, error = %e, "datagram send failed");
                    self.metrics.send_error();
                }
            }
        }
    }
}
