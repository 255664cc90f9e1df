//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::{InstanceId, PlayerSlot, Position, TargetRef};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    FindGame,

    /// Leave the matchmaking queue before being paired
    LeaveQueue,

    /// Deploy a card in the current match
    PlayCard { payload: PlayCardPayload },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Any message type this server doesn't know
    #[serde(other)]
    Unknown,
}

/// Body of a `play_card` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayCardPayload {
    pub card_id: String,
    /// Deploy point in the sender's own frame (own base line at y = 0)
    pub placement: Position,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// Paired with an opponent; sent once before the first tick
    GameStart { player: PlayerSlot },

    /// Per-tick state snapshot
    GameState {
        /// Server tick number
        tick: u64,
        you: PlayerStateView,
        opponent: PlayerStateView,
        /// Events that occurred during this tick
        events: Vec<GameEvent>,
    },

    /// Match has ended; no further game_state follows
    GameOver {
        /// `None` for a draw or an aborted match
        winner: Option<PlayerSlot>,
        reason: GameOverReason,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// A tower was destroyed
    TowerDestroyed,
    /// Both towers fell on the same tick
    Draw,
    /// The other participant went away
    OpponentDisconnected,
    /// Server is shutting down
    Shutdown,
}

/// One player's state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateView {
    pub player: PlayerSlot,
    pub elixir: u32,
    /// Fraction (0-1) of the way to the next elixir point
    pub elixir_progress: f32,
    pub units: Vec<InstanceView>,
    pub buildings: Vec<InstanceView>,
    pub tower: TowerView,
}

/// A unit or building in a snapshot (world coordinates)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub card_id: String,
    pub hit_points: u32,
    pub x: f32,
    pub y: f32,
    /// Seconds left (buildings only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<f32>,
    pub target: Option<TargetRef>,
}

/// A tower in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerView {
    pub hit_points: u32,
    pub x: f32,
    pub y: f32,
}

/// Game events (spawns, deaths, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A card was played
    Spawned {
        owner: PlayerSlot,
        instance_id: InstanceId,
        card_id: String,
        x: f32,
        y: f32,
    },

    /// An instance was removed
    Destroyed {
        owner: PlayerSlot,
        instance_id: InstanceId,
        cause: DestroyCause,
    },

    /// A tower fell
    TowerDestroyed { owner: PlayerSlot },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyCause {
    Killed,
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_game_decodes() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"find_game"}"#).unwrap();
        assert_eq!(msg, ClientMsg::FindGame);
    }

    #[test]
    fn play_card_uses_camel_case_payload() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"play_card","payload":{"cardId":"knight","placement":{"x":4.5,"y":10}}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMsg::PlayCard {
                payload: PlayCardPayload {
                    card_id: "knight".to_string(),
                    placement: Position { x: 4.5, y: 10.0 },
                }
            }
        );
    }

    #[test]
    fn unknown_type_is_an_explicit_variant() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"emote","id":3}"#).unwrap();
        assert_eq!(msg, ClientMsg::Unknown);
    }

    #[test]
    fn play_card_without_payload_is_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"play_card"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(
            r#"{"type":"play_card","payload":{"cardId":"knight"}}"#
        )
        .is_err());
    }

    #[test]
    fn game_start_names_the_slot() {
        let json = serde_json::to_value(ServerMsg::GameStart {
            player: PlayerSlot::Player1,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "game_start", "player": "player1"}));
    }
}
