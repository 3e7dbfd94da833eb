//! Closed message catalogue.
//!
//! Every payload variant the server understands is listed once in
//! `message_catalogue!`, which generates the numeric [`MessageType`] tag, the
//! [`Message`] sum type and the tag → decoder dispatch. Anything outside this
//! list is an unknown type at decode time.

use bytes::BytesMut;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::core::wire::WireFormat;
use crate::error::Result;
use crate::protocol::payloads::*;

macro_rules! message_catalogue {
    ($( $variant:ident = $tag:literal ),* $(,)?) => {
        /// Numeric tag carried in the first byte of every frame.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
        #[repr(u8)]
        pub enum MessageType {
            $( $variant = $tag, )*
        }

        /// A decoded payload of one of the registered types.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Message {
            $( $variant($variant), )*
        }

        impl Message {
            pub fn msg_type(&self) -> MessageType {
                match self {
                    $( Message::$variant(_) => MessageType::$variant, )*
                }
            }

            pub fn encode(&self, buf: &mut BytesMut) {
                match self {
                    $( Message::$variant(m) => m.encode(buf), )*
                }
            }

            pub fn encoded_len(&self) -> usize {
                match self {
                    $( Message::$variant(m) => m.encoded_len(), )*
                }
            }

            /// Decode the payload for `msg_type` from the front of `buf`.
            pub fn decode(msg_type: MessageType, buf: &mut &[u8]) -> Result<Message> {
                Ok(match msg_type {
                    $( MessageType::$variant => Message::$variant($variant::decode(buf)?), )*
                })
            }
        }

        $(
            impl From<$variant> for Message {
                fn from(m: $variant) -> Self {
                    Message::$variant(m)
                }
            }
        )*
    };
}

message_catalogue! {
    Connected = 3,
    CreateAcct = 4,
    CreateAcctResp = 5,
    Login = 6,
    LoginResp = 7,
    CreateChar = 8,
    CreateCharResp = 9,
    DeleteChar = 10,
    Character = 11,
    ListGames = 12,
    ListGamesResp = 13,
    CreateGame = 14,
    CreateGameResp = 15,
    JoinGame = 16,
    GameConnected = 17,
    Entity = 18,
    EntityMove = 19,
    UseAbility = 20,
    AbilityResult = 21,
    EndGame = 22,
    Multipart = 23,
    Heartbeat = 24,
    Disconnected = 255,
}

impl MessageType {
    /// Look up a wire tag. `None` means the tag is not registered.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<MessageType> {
        MessageType::try_from(tag).ok()
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self.into()
    }

    /// Types handled by the connection manager before a session is bound.
    pub fn is_pre_session(self) -> bool {
        matches!(
            self,
            MessageType::CreateAcct
                | MessageType::Login
                | MessageType::ListGames
                | MessageType::JoinGame
                | MessageType::CreateGame
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(MessageType::Login.tag(), 6);
        assert_eq!(MessageType::Multipart.tag(), 23);
        assert_eq!(MessageType::Disconnected.tag(), 255);
        assert_eq!(MessageType::from_tag(6), Some(MessageType::Login));
    }

    #[test]
    fn test_reserved_tags_are_unknown() {
        for tag in [0u8, 1, 2, 25, 100, 254] {
            assert_eq!(MessageType::from_tag(tag), None, "tag {tag}");
        }
    }

    #[test]
    fn test_msg_type_matches_variant() {
        let msg: Message = Login::default().into();
        assert_eq!(msg.msg_type(), MessageType::Login);
        let msg: Message = Heartbeat { time: 5 }.into();
        assert_eq!(msg.msg_type(), MessageType::Heartbeat);
    }

    #[test]
    fn test_pre_session_set() {
        assert!(MessageType::Login.is_pre_session());
        assert!(MessageType::CreateGame.is_pre_session());
        assert!(!MessageType::EntityMove.is_pre_session());
        assert!(!MessageType::Heartbeat.is_pre_session());
    }
}
