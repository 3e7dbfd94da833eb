// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Instant;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::codec::PacketCodec;
use crate::core::frame::FRAME_LEN;
use crate::core::packet::{next_packet, Packet};
use crate::protocol::dispatcher::{route, Route};
use crate::protocol::message::{Message, MessageType};
use crate::protocol::multipart::{split_payload, Reassembler, FRAGMENT_OVERHEAD};
use crate::protocol::payloads::*;

fn lobby() -> ListGamesResp {
    ListGamesResp {
        ids: (1..=60).collect(),
        names: (1..=60).map(|i| format!("dungeon #{i}")).collect(),
    }
}

#[test]
fn test_fragments_through_codec_stream() {
    // Sender side: pack, split to fit 512-byte datagrams, pack every fragment.
    let original: Message = lobby().into();
    let packed = Packet::new(original.clone()).pack().unwrap();
    let fragments = split_payload(&packed, 512 - FRAGMENT_OVERHEAD, 42).unwrap();
    assert!(fragments.len() > 1);

    let mut codec = PacketCodec;
    let mut stream = BytesMut::new();
    for fragment in fragments {
        let packet = Packet::new(fragment);
        assert!(packet.len() <= 512);
        codec.encode(packet, &mut stream).unwrap();
    }

    // Receiver side: decode each fragment, reassemble, decode the result.
    let mut reassembler = Reassembler::default();
    let mut complete = None;
    while let Some(packet) = codec.decode(&mut stream).unwrap() {
        assert_eq!(route(packet.msg_type()), Route::Reassemble);
        let Message::Multipart(fragment) = packet.message else {
            panic!("expected a fragment");
        };
        if let Some(bytes) = reassembler.insert(fragment, Instant::now()).unwrap() {
            complete = Some(bytes);
        }
    }

    let (decoded, used) = next_packet(&complete.expect("group should complete"))
        .unwrap()
        .unwrap();
    assert_eq!(used, packed.len());
    assert_eq!(decoded.message, original);
    assert_eq!(route(decoded.msg_type()), Route::Session);
}

#[test]
fn test_every_rotation_with_duplicates_reassembles() {
    let packed = Packet::new(lobby()).pack().unwrap();
    let fragments = split_payload(&packed, 128, 1).unwrap();
    let n = fragments.len();

    for rotation in 0..n {
        let mut order: Vec<usize> = (0..n).map(|i| (i + rotation) % n).collect();
        // Re-deliver the first fragment before the last one lands.
        order.insert(n - 1, order[0]);

        let mut r = Reassembler::default();
        let mut result = None;
        for (k, idx) in order.iter().enumerate() {
            let out = r.insert(fragments[*idx].clone(), Instant::now()).unwrap();
            if k + 1 < order.len() {
                assert!(out.is_none(), "completed early at step {k}");
            }
            result = out;
        }
        assert_eq!(result.as_deref(), Some(&packed[..]), "rotation {rotation}");
    }
}

fn entity(id: u32) -> Entity {
    Entity {
        id,
        etype: 4,
        seed: 0xC0FFEE,
        x: -12,
        y: 40,
        height: 2,
        width: 1,
        health_percent: 75,
    }
}

/// One non-trivial sample per type. The match is exhaustive, so a new
/// catalogue entry does not compile until it gets a sample.
fn sample(msg_type: MessageType) -> Message {
    match msg_type {
        MessageType::Connected => Connected { is_connected: 1 }.into(),
        MessageType::CreateAcct => CreateAcct {
            name: "n".into(),
            password: "p".into(),
            char_name: "c".into(),
        }
        .into(),
        MessageType::CreateAcctResp => CreateAcctResp {
            account_id: 17,
            name: "n".into(),
        }
        .into(),
        MessageType::Login => Login {
            name: "n".into(),
            password: "p".into(),
        }
        .into(),
        MessageType::LoginResp => LoginResp {
            success: 1,
            name: "n".into(),
            account_id: 3,
            characters: vec![Character {
                id: 1,
                name: "hero".into(),
            }],
        }
        .into(),
        MessageType::CreateChar => CreateChar {
            account_id: 3,
            name: "hero".into(),
            kit: 2,
        }
        .into(),
        MessageType::CreateCharResp => CreateCharResp {
            account_id: 3,
            character: Character {
                id: 8,
                name: "hero".into(),
            },
        }
        .into(),
        MessageType::DeleteChar => DeleteChar { id: 8 }.into(),
        MessageType::Character => Character {
            id: 9,
            name: "mage".into(),
        }
        .into(),
        MessageType::ListGames => ListGames {}.into(),
        MessageType::ListGamesResp => lobby().into(),
        MessageType::CreateGame => CreateGame { name: "g".into() }.into(),
        MessageType::CreateGameResp => CreateGameResp {
            name: "g".into(),
            id: 5,
            seed: 99,
            entities: vec![entity(1), entity(2), entity(3)],
        }
        .into(),
        MessageType::JoinGame => JoinGame { id: 5, char_id: 8 }.into(),
        MessageType::GameConnected => GameConnected {
            id: 5,
            seed: 99,
            entities: vec![entity(4), entity(5)],
        }
        .into(),
        MessageType::Entity => entity(6).into(),
        MessageType::EntityMove => EntityMove { direction: 3 }.into(),
        MessageType::UseAbility => UseAbility {
            ability_id: -1,
            target: 8,
        }
        .into(),
        MessageType::AbilityResult => AbilityResult {
            target: entity(7),
            damage: -30,
            state: 1,
        }
        .into(),
        MessageType::EndGame => EndGame {}.into(),
        MessageType::Multipart => Multipart {
            id: 1,
            group_id: 77,
            num_parts: 3,
            content: vec![1, 2, 3],
        }
        .into(),
        MessageType::Heartbeat => Heartbeat { time: 1_700_000_000 }.into(),
        MessageType::Disconnected => Disconnected {}.into(),
    }
}

#[test]
fn test_every_catalogue_type_decodes_from_its_tag() {
    let mut registered = 0;
    for tag in 0..=u8::MAX {
        let Some(msg_type) = MessageType::from_tag(tag) else {
            continue;
        };
        registered += 1;

        let msg = sample(msg_type);
        assert_eq!(msg.msg_type(), msg_type);
        let packet = Packet::with_sequence(msg.clone(), 11);
        let bytes = packet.pack().unwrap();
        assert_eq!(bytes[0], tag);
        assert_eq!(packet.len(), FRAME_LEN + packet.frame.content_length as usize);
        assert_eq!(packet.len(), bytes.len(), "{msg_type:?}");

        let (decoded, used) = next_packet(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len(), "{msg_type:?}");
        assert_eq!(decoded.frame.sequence, 11);
        assert_eq!(decoded.message, msg, "{msg_type:?}");
    }
    assert_eq!(registered, 23);
}
