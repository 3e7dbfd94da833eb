//! Routing decision for decoded inbound messages.
//!
//! The pump asks [`route`] where each message goes and then performs the
//! delivery itself; this module holds no channels.

use crate::protocol::message::{Message, MessageType};

/// Where a decoded message should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Account and lobby traffic handled before a session is bound
    Manager,
    /// In-game traffic for the bound session
    Session,
    /// Fragment to feed into reassembly
    Reassemble,
    /// Client heartbeat; only refreshes liveness
    Liveness,
    /// Disconnect sentinel
    Disconnect,
}

#[inline]
pub fn route(msg_type: MessageType) -> Route {
    match msg_type {
        MessageType::Disconnected => Route::Disconnect,
        MessageType::Multipart => Route::Reassemble,
        MessageType::Heartbeat => Route::Liveness,
        t if t.is_pre_session() => Route::Manager,
        _ => Route::Session,
    }
}

/// Route for an already decoded message.
#[inline]
pub fn route_message(msg: &Message) -> Route {
    route(msg.msg_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payloads::{EntityMove, JoinGame};

    #[test]
    fn test_pre_session_goes_to_manager() {
        for t in [
            MessageType::CreateAcct,
            MessageType::Login,
            MessageType::ListGames,
            MessageType::JoinGame,
            MessageType::CreateGame,
        ] {
            assert_eq!(route(t), Route::Manager, "{t:?}");
        }
    }

    #[test]
    fn test_control_types() {
        assert_eq!(route(MessageType::Disconnected), Route::Disconnect);
        assert_eq!(route(MessageType::Multipart), Route::Reassemble);
        assert_eq!(route(MessageType::Heartbeat), Route::Liveness);
    }

    #[test]
    fn test_everything_else_is_session() {
        assert_eq!(
            route_message(&EntityMove { direction: 3 }.into()),
            Route::Session
        );
        assert_eq!(route(MessageType::UseAbility), Route::Session);
        assert_eq!(route(MessageType::CreateChar), Route::Session);
        assert_eq!(
            route_message(&JoinGame { id: 1, char_id: 2 }.into()),
            Route::Manager
        );
    }
}
