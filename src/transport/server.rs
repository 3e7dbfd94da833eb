//! # UDP Server
//!
//! Owns the socket and demultiplexes datagrams by source address. Each new
//! address gets a [`Peer`], a ring buffer and a pump task; the outbound
//! dispatcher runs alongside on the same socket.
//!
//! The receive loop never waits on a connection: a datagram that does not fit
//! its connection's ring buffer is dropped and counted.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::transport::connection::{Connection, ConnectionState, PumpConfig, PumpLinks};
use crate::transport::outbound::{OutboundDispatcher, OutboundSender, OutgoingMessage};
use crate::transport::peer::{ConnectionId, InboundMessage, Peer};
use crate::utils::metrics::Metrics;
use crate::utils::ring_buffer::RingBuffer;
use crate::utils::timeout::with_timeout;

struct ConnectionEntry {
    peer: Peer,
    ring: Arc<RingBuffer>,
    task: JoinHandle<ConnectionState>,
}

/// Live connections keyed by remote address.
struct ConnectionTable {
    entries: HashMap<SocketAddr, ConnectionEntry>,
    next_id: ConnectionId,
    config: NetworkConfig,
    pump_config: PumpConfig,
    links: PumpLinks,
    metrics: Arc<Metrics>,
}

impl ConnectionTable {
    fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        self.metrics.datagram_received(datagram.len() as u64);

        if datagram.is_empty() {
            if let Some(entry) = self.entries.get(&from) {
                debug!(peer = %entry.peer, "zero-length datagram, closing connection");
                entry.ring.close();
            }
            return;
        }

        // A pump that already finished leaves a closed ring behind until its
        // notice is processed; new traffic from that address starts over.
        if self
            .entries
            .get(&from)
            .is_some_and(|entry| entry.ring.is_closed())
        {
            self.entries.remove(&from);
        }

        if !self.entries.contains_key(&from) && !self.open(from) {
            self.metrics.datagram_dropped();
            return;
        }

        let Some(entry) = self.entries.get(&from) else {
            return;
        };
        match entry.ring.try_write(datagram) {
            Ok(true) => {}
            Ok(false) => {
                warn!(peer = %entry.peer, bytes = datagram.len(), "ring buffer full, dropping datagram");
                self.metrics.datagram_dropped();
            }
            Err(e) => {
                debug!(peer = %entry.peer, error = %e, "dropping datagram for closing connection");
                self.metrics.datagram_dropped();
            }
        }
    }

    /// Create a connection for `addr`. `false` if none could be created.
    fn open(&mut self, addr: SocketAddr) -> bool {
        if self.entries.len() >= self.config.server.max_connections {
            warn!(peer = %addr, max = self.config.server.max_connections, "connection limit reached");
            self.metrics.connection_rejected();
            return false;
        }

        let ring = match RingBuffer::new(self.config.transport.ring_buffer_capacity) {
            Ok(ring) => Arc::new(ring),
            Err(e) => {
                error!(peer = %addr, error = %e, "could not allocate ring buffer");
                return false;
            }
        };

        self.next_id += 1;
        let (peer, admin_rx) =
            Peer::channel(self.next_id, addr, self.config.server.admin_queue_size);
        let conn = Connection::new(
            peer.clone(),
            ring.clone(),
            admin_rx,
            self.links.clone(),
            self.pump_config.clone(),
            self.metrics.clone(),
        );
        let task = tokio::spawn(conn.run());

        self.metrics.connection_established();
        info!(peer = %peer, "new connection");
        self.entries.insert(addr, ConnectionEntry { peer, ring, task });
        true
    }

    /// Forget a terminated pump, unless its address was already reused.
    fn closed(&mut self, peer: Peer) {
        self.metrics.connection_closed();
        if self
            .entries
            .get(&peer.addr())
            .is_some_and(|entry| entry.peer == peer)
        {
            self.entries.remove(&peer.addr());
        }
        debug!(peer = %peer, remaining = self.entries.len(), "connection removed");
    }

    fn drain(&mut self) -> Vec<JoinHandle<ConnectionState>> {
        self.entries
            .drain()
            .map(|(_, entry)| {
                entry.ring.close();
                entry.task
            })
            .collect()
    }
}

pub struct UdpServer {
    socket: Arc<UdpSocket>,
    config: NetworkConfig,
    to_manager: mpsc::Sender<InboundMessage>,
    outbound: OutboundSender,
    outbound_rx: mpsc::Receiver<OutgoingMessage>,
    metrics: Arc<Metrics>,
}

impl UdpServer {
    /// Validate `config` and bind the socket.
    ///
    /// Every decoded pre-session message, plus a `Connected` and a
    /// `Disconnected` notice per connection, is delivered to `to_manager`.
    ///
    /// # Errors
    /// `ConfigError` for an invalid configuration, `Io` if the bind fails.
    #[instrument(skip(config, to_manager), fields(address = %config.server.address))]
    pub async fn bind(
        config: NetworkConfig,
        to_manager: mpsc::Sender<InboundMessage>,
    ) -> Result<Self> {
        config.validate_strict()?;

        let socket = UdpSocket::bind(&config.server.address).await?;
        info!(local = %socket.local_addr()?, "UDP server listening");

        let (outbound, outbound_rx) = OutboundSender::channel(config.server.backpressure_limit);
        Ok(Self {
            socket: Arc::new(socket),
            config,
            to_manager,
            outbound,
            outbound_rx,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Producer handle for the outbound queue.
    pub fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Run until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });
        self.run_with_shutdown(shutdown_rx).await
    }

    /// Run until `shutdown_rx` yields (or its sender is dropped).
    ///
    /// # Errors
    /// A non-transient socket error ends the receive loop and is returned
    /// after the connections have been shut down.
    #[instrument(name = "udp_server", skip_all, fields(address = %self.config.server.address))]
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let UdpServer {
            socket,
            config,
            to_manager,
            outbound,
            outbound_rx,
            metrics,
        } = self;

        let (dispatch_stop_tx, dispatch_stop_rx) = mpsc::channel::<()>(1);
        let dispatcher = OutboundDispatcher::new(
            outbound_rx,
            socket.clone(),
            &config.transport,
            metrics.clone(),
        );
        let dispatcher_task = tokio::spawn(dispatcher.run(dispatch_stop_rx));

        let (closed_tx, mut closed_rx) = mpsc::channel::<Peer>(config.server.backpressure_limit);
        let mut table = ConnectionTable {
            entries: HashMap::new(),
            next_id: 0,
            pump_config: PumpConfig::from(&config),
            links: PumpLinks {
                to_manager,
                outbound: outbound.clone(),
                closed: Some(closed_tx),
            },
            config: config.clone(),
            metrics: metrics.clone(),
        };

        let mut recv_buf = vec![0u8; config.transport.recv_buffer_size];
        let result = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    break Ok(());
                }
                Some(peer) = closed_rx.recv() => table.closed(peer),
                recv = socket.recv_from(&mut recv_buf) => match recv {
                    Ok((n, from)) => table.handle_datagram(&recv_buf[..n], from),
                    Err(e) if is_transient(&e) => {
                        debug!(error = %e, "transient socket error");
                    }
                    Err(e) => {
                        error!(error = %e, "socket receive failed");
                        break Err(e.into());
                    }
                }
            }
        };

        // Pumps ignore a closed notice channel on the way out.
        drop(closed_rx);
        let tasks = table.drain();
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let pending = tasks.len();
        if with_timeout(
            config.server.shutdown_timeout,
            futures::future::join_all(tasks),
        )
        .await
        .is_err()
        {
            warn!(pending, "Shutdown timeout reached, aborting connections");
            for handle in aborts {
                handle.abort();
            }
        }

        drop(table);
        drop(outbound);
        let _ = dispatch_stop_tx.send(()).await;
        if with_timeout(config.server.shutdown_timeout, dispatcher_task)
            .await
            .is_err()
        {
            warn!("outbound dispatcher did not stop in time");
        }

        metrics.log_metrics();
        info!("server stopped");
        result
    }
}

/// Errors that don't indicate a broken socket. ICMP port-unreachable replies
/// surface as `ConnectionReset` on some platforms.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
