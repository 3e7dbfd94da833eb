//! # Client Message Pump
//!
//! One pump per connection. It reads raw bytes from the connection's ring
//! buffer into an accumulation buffer, decodes packets from it, feeds
//! fragments through reassembly and routes every complete message to the
//! connection manager or the bound session.
//!
//! ## Lifecycle
//! `Connecting → Active → Disconnecting → Terminated`
//!
//! The pump leaves `Active` on the disconnect sentinel, a closed ring buffer,
//! an admin `Disconnect`, an idle timeout or a malformed packet. On the way
//! out it closes the ring buffer, notifies the manager with `Disconnected` and
//! hands its peer handle back to the server.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Decoder;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::NetworkConfig;
use crate::core::codec::PacketCodec;
use crate::core::packet::next_packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{route, Route};
use crate::protocol::message::Message;
use crate::protocol::multipart::Reassembler;
use crate::protocol::payloads::{Connected, Disconnected, Heartbeat, Multipart};
use crate::transport::outbound::OutboundSender;
use crate::transport::peer::{AdminMessage, InboundMessage, Peer};
use crate::utils::metrics::Metrics;
use crate::utils::ring_buffer::RingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Disconnecting,
    Terminated,
}

/// Per-connection timing and sizing, taken from [`NetworkConfig`].
#[derive(Debug, Clone)]
pub struct PumpConfig {
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub read_chunk: usize,
    pub reassembly_timeout: Duration,
    pub max_pending_groups: usize,
    pub max_fragments_per_group: u16,
    pub max_pending_bytes: usize,
}

impl From<&NetworkConfig> for PumpConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            heartbeat_interval: config.server.heartbeat_interval,
            idle_timeout: config.server.idle_timeout,
            read_chunk: config.transport.recv_buffer_size,
            reassembly_timeout: config.transport.reassembly_timeout,
            max_pending_groups: config.transport.max_pending_groups,
            max_fragments_per_group: config.transport.max_fragments_per_group,
            max_pending_bytes: config.transport.max_pending_bytes,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

/// Queues a pump delivers to.
#[derive(Debug, Clone)]
pub struct PumpLinks {
    /// Connection manager: pre-session traffic plus Connected/Disconnected notices
    pub to_manager: mpsc::Sender<InboundMessage>,
    /// Outbound queue, used for heartbeat probes
    pub outbound: OutboundSender,
    /// Receives the peer handle once the pump has terminated
    pub closed: Option<mpsc::Sender<Peer>>,
}

enum Event {
    Read(Result<usize>),
    Admin(AdminMessage),
    Tick,
}

pub struct Connection {
    peer: Peer,
    ring: Arc<RingBuffer>,
    admin_rx: mpsc::Receiver<AdminMessage>,
    links: PumpLinks,
    session: Option<mpsc::Sender<InboundMessage>>,
    codec: PacketCodec,
    buffer: BytesMut,
    reassembler: Reassembler,
    state: ConnectionState,
    last_activity: Instant,
    config: PumpConfig,
    metrics: Arc<Metrics>,
}

impl Connection {
    pub fn new(
        peer: Peer,
        ring: Arc<RingBuffer>,
        admin_rx: mpsc::Receiver<AdminMessage>,
        links: PumpLinks,
        config: PumpConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            peer,
            ring,
            admin_rx,
            links,
            session: None,
            codec: PacketCodec,
            buffer: BytesMut::with_capacity(config.read_chunk),
            reassembler: Reassembler::new(config.reassembly_timeout, config.max_pending_groups)
                .with_limits(config.max_fragments_per_group, config.max_pending_bytes),
            state: ConnectionState::Connecting,
            last_activity: Instant::now(),
            config,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until the connection ends. Returns the final state, always
    /// `Terminated`.
    #[instrument(name = "pump", skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) -> ConnectionState {
        match self.announce().await {
            Ok(()) => self.state = ConnectionState::Active,
            Err(e) => {
                warn!(error = %e, "could not announce connection");
                self.state = ConnectionState::Disconnecting;
            }
        }

        let period = self.config.heartbeat_interval;
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut read_buf = vec![0u8; self.config.read_chunk.max(1)];

        while self.state == ConnectionState::Active {
            if let Err(e) = self.drain_buffer().await {
                warn!(error = %e, "terminating connection");
                self.metrics.protocol_error();
                self.state = ConnectionState::Disconnecting;
                break;
            }
            if self.state != ConnectionState::Active {
                break;
            }

            let event = tokio::select! {
                read = self.ring.read(&mut read_buf) => Event::Read(read),
                // The pump's own `Peer` holds an admin sender, so `recv` never
                // yields `None` while the pump runs.
                Some(admin) = self.admin_rx.recv() => Event::Admin(admin),
                _ = tick.tick() => Event::Tick,
            };

            match event {
                Event::Read(Ok(0)) => {
                    debug!("ring buffer closed");
                    self.state = ConnectionState::Disconnecting;
                }
                Event::Read(Ok(n)) => {
                    trace!(bytes = n, "read from ring buffer");
                    self.buffer.extend_from_slice(&read_buf[..n]);
                    self.last_activity = Instant::now();
                }
                Event::Read(Err(e)) => {
                    warn!(error = %e, "ring buffer read failed");
                    self.state = ConnectionState::Disconnecting;
                }
                Event::Admin(cmd) => self.handle_admin(cmd),
                Event::Tick => self.on_tick().await,
            }
        }

        self.finish().await;
        self.state
    }

    async fn announce(&self) -> Result<()> {
        self.to_manager(Connected { is_connected: 1 }.into()).await
    }

    /// Decode and route every complete packet currently buffered.
    async fn drain_buffer(&mut self) -> Result<()> {
        while self.state == ConnectionState::Active {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(packet)) => self.handle_message(packet.message).await?,
                Ok(None) => break,
                Err(ProtocolError::UnknownMessageType {
                    msg_type,
                    frame_len,
                }) => {
                    warn!(msg_type, frame_len, "dropping message of unknown type");
                    self.metrics.protocol_error();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Multipart(fragment) => self.reassemble(fragment).await,
            other => self.deliver(route(other.msg_type()), other).await,
        }
    }

    async fn reassemble(&mut self, fragment: Multipart) -> Result<()> {
        let group_id = fragment.group_id;
        let content = match self.reassembler.insert(fragment, Instant::now().into_std()) {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(()),
            Err(e) if !e.is_fatal_for_connection() => {
                warn!(group_id, error = %e, "dropping fragment");
                if matches!(e, ProtocolError::ReassemblyMismatch { .. }) {
                    self.metrics.reassemblies_discarded(1);
                }
                self.metrics.protocol_error();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.metrics.reassembly_completed();
        let mut rest: &[u8] = &content;
        while !rest.is_empty() && self.state == ConnectionState::Active {
            match next_packet(rest) {
                Ok(Some((packet, used))) => {
                    rest = &rest[used..];
                    let msg_type = packet.msg_type();
                    match route(msg_type) {
                        Route::Reassemble => {
                            warn!(group_id, "nested multipart dropped");
                            self.metrics.protocol_error();
                        }
                        r => self.deliver(r, packet.message).await?,
                    }
                }
                Ok(None) => {
                    return Err(ProtocolError::DeserializeError(format!(
                        "multipart group {group_id} ends with a partial packet"
                    )))
                }
                Err(ProtocolError::UnknownMessageType {
                    msg_type,
                    frame_len,
                }) => {
                    warn!(group_id, msg_type, "dropping reassembled message of unknown type");
                    self.metrics.protocol_error();
                    rest = &rest[frame_len..];
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn deliver(&mut self, route: Route, message: Message) -> Result<()> {
        match route {
            Route::Disconnect => {
                debug!("disconnect requested by client");
                self.state = ConnectionState::Disconnecting;
            }
            Route::Liveness => trace!("client heartbeat"),
            Route::Manager => {
                self.to_manager(message).await?;
                self.metrics.message_routed();
            }
            Route::Session => self.to_session(message).await,
            Route::Reassemble => {
                warn!("unexpected multipart routing");
                self.metrics.message_dropped();
            }
        }
        Ok(())
    }

    async fn to_manager(&self, message: Message) -> Result<()> {
        self.links
            .to_manager
            .send(InboundMessage {
                peer: self.peer.clone(),
                message,
            })
            .await
            .map_err(|_| ProtocolError::ChannelClosed(constants::ERR_MANAGER_GONE))
    }

    async fn to_session(&mut self, message: Message) {
        let msg_type = message.msg_type();
        let Some(session) = self.session.as_ref() else {
            warn!(?msg_type, "no active session, dropping message");
            self.metrics.message_dropped();
            return;
        };

        let inbound = InboundMessage {
            peer: self.peer.clone(),
            message,
        };
        if session.send(inbound).await.is_err() {
            warn!(?msg_type, "session queue closed, unbinding");
            self.session = None;
            self.metrics.message_dropped();
        } else {
            self.metrics.message_routed();
        }
    }

    fn handle_admin(&mut self, cmd: AdminMessage) {
        match cmd {
            AdminMessage::BindSession(session) => {
                debug!("session bound");
                self.session = Some(session);
            }
            AdminMessage::UnbindSession => {
                debug!("session unbound");
                self.session = None;
            }
            AdminMessage::Disconnect => {
                info!("disconnect requested by manager");
                self.state = ConnectionState::Disconnecting;
            }
        }
    }

    async fn on_tick(&mut self) {
        let expired = self.reassembler.expire(Instant::now().into_std());
        if expired > 0 {
            self.metrics.reassemblies_discarded(expired as u64);
        }

        let idle = self.last_activity.elapsed();
        if idle >= self.config.idle_timeout {
            info!(idle_ms = idle.as_millis() as u64, "idle timeout");
            self.state = ConnectionState::Disconnecting;
            return;
        }

        let probe = Heartbeat { time: unix_nanos() };
        match self.links.outbound.try_send(&self.peer, probe) {
            Ok(true) => trace!("heartbeat probe queued"),
            Ok(false) => debug!("outbound queue full, skipping heartbeat probe"),
            Err(e) => {
                warn!(error = %e, "outbound queue gone");
                self.state = ConnectionState::Disconnecting;
            }
        }
    }

    async fn finish(&mut self) {
        self.ring.close();
        if self.to_manager(Disconnected {}.into()).await.is_err() {
            debug!("manager gone before disconnect notice");
        }
        if let Some(closed) = self.links.closed.as_ref() {
            let _ = closed.send(self.peer.clone()).await;
        }
        self.state = ConnectionState::Terminated;
        info!("connection terminated");
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
