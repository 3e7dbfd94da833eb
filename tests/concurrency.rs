#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use survival_net::core::packet::Packet;
use survival_net::protocol::message::{Message, MessageType};
use survival_net::protocol::payloads::{CreateGame, Login};
use survival_net::transport::{Connection, OutboundSender, Peer, PumpConfig, PumpLinks};
use survival_net::utils::metrics::Metrics;
use survival_net::utils::ring_buffer::RingBuffer;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ring_buffer_spsc_across_threads() {
    let total = 2_000_000usize;
    let ring = Arc::new(RingBuffer::new(1021).unwrap());

    let writer = {
        let ring = ring.clone();
        tokio::spawn(async move {
            let mut next = 0usize;
            let mut chunk = Vec::with_capacity(777);
            while next < total {
                chunk.clear();
                let end = (next + 1 + next % 777).min(total);
                chunk.extend((next..end).map(|i| (i % 253) as u8));
                ring.write(&chunk).await.unwrap();
                next = end;
            }
        })
    };

    let mut seen = 0usize;
    let mut buf = vec![0u8; 613];
    while seen < total {
        let n = ring.read(&mut buf).await.unwrap();
        for (k, b) in buf[..n].iter().enumerate() {
            assert_eq!(*b, ((seen + k) % 253) as u8, "byte {}", seen + k);
        }
        seen += n;
    }
    writer.await.unwrap();
    assert!(ring.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_pumps_share_one_manager() {
    let connections = 64u64;
    let per_connection = 200usize;

    let (to_manager, mut manager) = mpsc::channel(1024);
    let (outbound, _outbound_rx) = OutboundSender::channel(1024);
    let metrics = Arc::new(Metrics::new());

    let mut rings = Vec::new();
    let mut pumps = JoinSet::new();
    for id in 1..=connections {
        let addr = format!("127.0.0.1:{}", 20_000 + id).parse().unwrap();
        let (peer, admin_rx) = Peer::channel(id, addr, 4);
        let ring = Arc::new(RingBuffer::new(8192).unwrap());
        let links = PumpLinks {
            to_manager: to_manager.clone(),
            outbound: outbound.clone(),
            closed: None,
        };
        let conn = Connection::new(
            peer,
            ring.clone(),
            admin_rx,
            links,
            PumpConfig::default(),
            metrics.clone(),
        );
        pumps.spawn(conn.run());
        rings.push(ring);
    }
    drop(to_manager);

    let mut writers = JoinSet::new();
    for (i, ring) in rings.iter().enumerate() {
        let ring = ring.clone();
        writers.spawn(async move {
            for n in 0..per_connection {
                let msg = CreateGame {
                    name: format!("{i}:{n}"),
                };
                ring.write(&Packet::new(msg).pack().unwrap()).await.unwrap();
            }
            ring.close();
        });
    }

    let mut per_peer = std::collections::HashMap::<u64, Vec<String>>::new();
    let mut disconnected = 0u64;
    while let Some(msg) = tokio::time::timeout(Duration::from_secs(20), manager.recv())
        .await
        .expect("manager stalled")
    {
        match msg.message {
            Message::CreateGame(game) => per_peer.entry(msg.peer.id()).or_default().push(game.name),
            Message::Disconnected(_) => disconnected += 1,
            other => assert_eq!(other.msg_type(), MessageType::Connected),
        }
    }

    while let Some(res) = writers.join_next().await {
        res.unwrap();
    }
    while let Some(res) = pumps.join_next().await {
        res.unwrap();
    }

    assert_eq!(disconnected, connections);
    assert_eq!(per_peer.len() as u64, connections);
    for names in per_peer.values() {
        assert_eq!(names.len(), per_connection);
        // Per-connection order is preserved.
        let prefix = names[0].split(':').next().unwrap().to_string();
        for (n, name) in names.iter().enumerate() {
            assert_eq!(*name, format!("{prefix}:{n}"));
        }
    }
    assert_eq!(
        metrics.snapshot().messages_routed,
        connections * per_connection as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admin_commands_race_with_traffic() {
    let (to_manager, mut manager) = mpsc::channel(256);
    let (outbound, _outbound_rx) = OutboundSender::channel(16);
    let (peer, admin_rx) = Peer::channel(1, "127.0.0.1:30001".parse().unwrap(), 4);
    let ring = Arc::new(RingBuffer::new(4096).unwrap());
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
    let pump = tokio::spawn(conn.run());

    let writer = {
        let ring = ring.clone();
        tokio::spawn(async move {
            for _ in 0..10_000 {
                let login = Login::default();
                if ring.write(&Packet::new(login).pack().unwrap()).await.is_err() {
                    break;
                }
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(5)).await;
    let (session_tx, _session_rx) = mpsc::channel(1);
    peer.bind_session(session_tx).await.unwrap();
    peer.unbind_session().await.unwrap();
    peer.disconnect().await.unwrap();

    let drain = tokio::spawn(async move { while manager.recv().await.is_some() {} });
    let state = tokio::time::timeout(Duration::from_secs(10), pump)
        .await
        .expect("pump should stop")
        .unwrap();
    assert_eq!(state, survival_net::transport::ConnectionState::Terminated);
    writer.await.unwrap();
    drain.await.unwrap();
}
