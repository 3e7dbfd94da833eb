//! End-to-end tests
//!
//! Bytes in at the ring buffer or the socket, routed messages out at the
//! manager, and replies back to a real UDP client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use survival_net::config::NetworkConfig;
use survival_net::core::packet::{next_packet, Packet};
use survival_net::protocol::message::{Message, MessageType};
use survival_net::protocol::multipart::Reassembler;
use survival_net::protocol::payloads::{Character, CreateGame, Login, LoginResp};
use survival_net::transport::outbound::encode_datagrams;
use survival_net::transport::{
    Connection, InboundMessage, OutboundSender, Peer, PumpConfig, PumpLinks, UdpServer,
};
use survival_net::utils::metrics::Metrics;
use survival_net::utils::ring_buffer::RingBuffer;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn next_routed(manager: &mut mpsc::Receiver<InboundMessage>) -> InboundMessage {
    timeout(WAIT, manager.recv())
        .await
        .expect("manager should receive a message")
        .expect("manager channel open")
}

fn spawn_pump() -> (Peer, Arc<RingBuffer>, mpsc::Receiver<InboundMessage>) {
    let (peer, admin_rx) = Peer::channel(7, "127.0.0.1:45000".parse().unwrap(), 4);
    let ring = Arc::new(RingBuffer::new(32 * 1024).unwrap());
    let (to_manager, manager) = mpsc::channel(16);
    let (outbound, outbound_rx) = OutboundSender::channel(16);
    let conn = Connection::new(
        peer.clone(),
        ring.clone(),
        admin_rx,
        PumpLinks {
            to_manager,
            outbound,
            closed: None,
        },
        PumpConfig::default(),
        Arc::new(Metrics::new()),
    );
    tokio::spawn(async move {
        let _outbound_rx = outbound_rx;
        conn.run().await
    });
    (peer, ring, manager)
}

#[tokio::test]
async fn test_packet_split_across_two_writes() {
    let (_peer, ring, mut manager) = spawn_pump();
    assert_eq!(
        next_routed(&mut manager).await.message.msg_type(),
        MessageType::Connected
    );

    let login = Login {
        name: "ana".into(),
        password: "hunter2".into(),
    };
    let bytes = Packet::new(login.clone()).pack().unwrap();
    ring.write(&bytes[..7]).await.unwrap();
    assert!(timeout(Duration::from_millis(50), manager.recv())
        .await
        .is_err());
    ring.write(&bytes[7..]).await.unwrap();

    assert_eq!(next_routed(&mut manager).await.message, Message::Login(login));
}

#[tokio::test]
async fn test_large_payload_reassembled_from_fragments() {
    let (peer, ring, mut manager) = spawn_pump();
    next_routed(&mut manager).await;

    // 4-byte length prefix plus 1296 characters: a 1300-byte payload.
    let game = CreateGame {
        name: "g".repeat(1296),
    };
    let parts = encode_datagrams(&peer, game.clone().into(), 512).unwrap();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.len() <= 512));

    for part in &parts {
        ring.write(part).await.unwrap();
    }
    assert_eq!(
        next_routed(&mut manager).await.message,
        Message::CreateGame(game)
    );
}

fn loopback_config() -> NetworkConfig {
    NetworkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".into();
        c.server.shutdown_timeout = Duration::from_secs(2);
    })
}

/// Receive datagrams until a complete non-heartbeat message arrives.
async fn recv_message(client: &UdpSocket, reassembler: &mut Reassembler) -> Message {
    let mut buf = vec![0u8; 2048];
    loop {
        let (n, _) = timeout(WAIT, client.recv_from(&mut buf))
            .await
            .expect("client should receive a datagram")
            .unwrap();
        let (packet, used) = next_packet(&buf[..n]).unwrap().expect("whole packet");
        assert_eq!(used, n, "one packet per datagram");
        match packet.message {
            Message::Heartbeat(_) => continue,
            Message::Multipart(fragment) => {
                if let Some(content) = reassembler.insert(fragment, Instant::now()).unwrap() {
                    let (inner, _) = next_packet(&content).unwrap().unwrap();
                    return inner.message;
                }
            }
            other => return other,
        }
    }
}

#[tokio::test]
async fn test_udp_login_roundtrip() {
    let (to_manager, mut manager) = mpsc::channel(64);
    let server = UdpServer::bind(loopback_config(), to_manager).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let outbound = server.outbound();
    let metrics = server.metrics();
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(stop_rx));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_addr = client.local_addr().unwrap();
    let login = Login {
        name: "ana".into(),
        password: "hunter2".into(),
    };
    client
        .send_to(&Packet::new(login.clone()).pack().unwrap(), server_addr)
        .await
        .unwrap();

    let connected = next_routed(&mut manager).await;
    assert_eq!(connected.message.msg_type(), MessageType::Connected);
    assert_eq!(connected.peer.addr(), client_addr);
    let routed = next_routed(&mut manager).await;
    assert_eq!(routed.message, Message::Login(login));
    let peer = routed.peer;

    // Small reply fits in one datagram.
    let reply = LoginResp {
        success: 1,
        name: "ana".into(),
        account_id: 42,
        characters: vec![],
    };
    outbound.send(&peer, reply.clone()).await.unwrap();
    let mut reassembler = Reassembler::default();
    assert_eq!(
        recv_message(&client, &mut reassembler).await,
        Message::LoginResp(reply)
    );

    // Large reply arrives as fragments.
    let big = LoginResp {
        success: 1,
        name: "ana".into(),
        account_id: 42,
        characters: (0..60)
            .map(|id| Character {
                id,
                name: format!("character-{id:010}"),
            })
            .collect(),
    };
    outbound.send(&peer, big.clone()).await.unwrap();
    assert_eq!(
        recv_message(&client, &mut reassembler).await,
        Message::LoginResp(big)
    );
    assert!(metrics.snapshot().fragments_sent >= 3);

    // A zero-length datagram ends the connection.
    client.send_to(&[], server_addr).await.unwrap();
    let notice = next_routed(&mut manager).await;
    assert_eq!(notice.message.msg_type(), MessageType::Disconnected);
    assert_eq!(notice.peer, peer);

    stop_tx.send(()).await.unwrap();
    timeout(WAIT, server_task)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();

    assert_eq!(metrics.snapshot().connections_total, 1);
}

#[tokio::test]
async fn test_shutdown_disconnects_live_clients() {
    let (to_manager, mut manager) = mpsc::channel(64);
    let server = UdpServer::bind(loopback_config(), to_manager).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(stop_rx));

    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&Packet::new(Login::default()).pack().unwrap(), server_addr)
            .await
            .unwrap();
        clients.push(client);
    }
    let mut connected = 0;
    while connected < 3 {
        if next_routed(&mut manager).await.message.msg_type() == MessageType::Connected {
            connected += 1;
        }
    }

    stop_tx.send(()).await.unwrap();
    let mut disconnected = 0;
    while disconnected < 3 {
        if next_routed(&mut manager).await.message.msg_type() == MessageType::Disconnected {
            disconnected += 1;
        }
    }
    timeout(WAIT, server_task)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}
