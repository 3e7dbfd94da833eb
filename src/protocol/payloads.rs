//! Concrete payload types carried inside packets.
//!
//! Field order is wire order. Every type gets `Debug`, `Clone`, `Default`
//! (the zero value the decoder starts from), `PartialEq` and a
//! [`WireFormat`] implementation generated from its field list.

use bytes::BytesMut;

use crate::core::wire::WireFormat;
use crate::error::Result;

macro_rules! net_message {
    ($(
        $(#[$meta:meta])*
        $name:ident { $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)? }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq, Eq)]
            pub struct $name {
                $( $(#[$fmeta])* pub $field: $ty, )*
            }

            impl WireFormat for $name {
                fn encode(&self, buf: &mut BytesMut) {
                    let _ = &buf;
                    $( self.$field.encode(buf); )*
                }

                fn decode(buf: &mut &[u8]) -> Result<Self> {
                    let _ = &buf;
                    Ok(Self {
                        $( $field: <$ty as WireFormat>::decode(buf)?, )*
                    })
                }

                fn encoded_len(&self) -> usize {
                    0 $( + self.$field.encoded_len() )*
                }
            }
        )*
    };
}

net_message! {
    /// Sent to the connection manager when a pump starts.
    Connected {
        is_connected: u8,
    }

    /// Disconnect sentinel. Carries no payload.
    Disconnected {}

    CreateAcct {
        name: String,
        password: String,
        char_name: String,
    }

    CreateAcctResp {
        account_id: u32,
        name: String,
    }

    Login {
        name: String,
        password: String,
    }

    LoginResp {
        success: u8,
        name: String,
        account_id: u32,
        characters: Vec<Character>,
    }

    CreateChar {
        account_id: u32,
        name: String,
        kit: u8,
    }

    CreateCharResp {
        account_id: u32,
        character: Character,
    }

    DeleteChar {
        id: u32,
    }

    Character {
        id: u32,
        name: String,
    }

    ListGames {}

    ListGamesResp {
        ids: Vec<u32>,
        names: Vec<String>,
    }

    CreateGame {
        name: String,
    }

    CreateGameResp {
        name: String,
        id: u32,
        seed: u64,
        entities: Vec<Entity>,
    }

    JoinGame {
        id: u32,
        char_id: u32,
    }

    GameConnected {
        id: u32,
        seed: u64,
        entities: Vec<Entity>,
    }

    Entity {
        id: u32,
        etype: u16,
        seed: u64,
        x: i32,
        y: i32,
        height: u32,
        width: u32,
        health_percent: u8,
    }

    EntityMove {
        direction: u8,
    }

    UseAbility {
        ability_id: i32,
        target: u32,
    }

    AbilityResult {
        target: Entity,
        damage: i32,
        state: u8,
    }

    EndGame {}

    /// One numbered slice of a payload too large for a single datagram.
    Multipart {
        /// Position within the group, starting at 0
        id: u16,
        group_id: u32,
        num_parts: u16,
        content: Vec<u8>,
    }

    /// Liveness probe. `time` is nanoseconds since the Unix epoch.
    Heartbeat {
        time: i64,
    }
}

/// Encoded size of a [`Multipart`] payload with empty content.
pub const MULTIPART_HEADER_LEN: usize = 2 + 4 + 2 + 4;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_empty_payloads_have_zero_length() {
        assert_eq!(ListGames {}.encoded_len(), 0);
        assert_eq!(Disconnected {}.encoded_len(), 0);
        let mut slice: &[u8] = &[];
        assert_eq!(EndGame::decode(&mut slice).unwrap(), EndGame {});
    }

    #[test]
    fn test_multipart_header_len() {
        assert_eq!(Multipart::default().encoded_len(), MULTIPART_HEADER_LEN);
    }

    #[test]
    fn test_nested_entity_roundtrip() {
        let result = AbilityResult {
            target: Entity {
                id: 9,
                etype: 2,
                seed: 0xDEAD_BEEF,
                x: -40,
                y: 12,
                height: 2,
                width: 1,
                health_percent: 75,
            },
            damage: -3,
            state: 1,
        };
        let mut buf = BytesMut::new();
        result.encode(&mut buf);
        assert_eq!(buf.len(), result.encoded_len());
        assert_eq!(buf.len(), 31 + 4 + 1);

        let mut slice = &buf[..];
        assert_eq!(AbilityResult::decode(&mut slice).unwrap(), result);
    }
}
