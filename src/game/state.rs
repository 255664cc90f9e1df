//! Authoritative match state owned by a room

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::{CardCategory, CardDefinition};

/// Arena width in arena units
pub const ARENA_WIDTH: f32 = 18.0;
/// Arena length (player1's base line is y = 0, player2's is y = ARENA_LENGTH)
pub const ARENA_LENGTH: f32 = 32.0;

/// Base structure stats; destroying a player's tower ends the match
pub const TOWER_HIT_POINTS: u32 = 2400;
pub const TOWER_DAMAGE: u32 = 50;
pub const TOWER_RANGE: f32 = 7.0;
pub const TOWER_ATTACK_INTERVAL: f32 = 1.0;
/// Distance of a tower from its owner's base line
const TOWER_OFFSET: f32 = 1.5;

/// Which side of the match a participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl PlayerSlot {
    pub const BOTH: [PlayerSlot; 2] = [PlayerSlot::Player1, PlayerSlot::Player2];

    pub fn index(self) -> usize {
        match self {
            Self::Player1 => 0,
            Self::Player2 => 1,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Self::Player1 => Self::Player2,
            Self::Player2 => Self::Player1,
        }
    }

    /// Map a position given in this player's own frame (own base line at y = 0)
    /// into world coordinates.
    pub fn to_world(self, local: Position) -> Position {
        match self {
            Self::Player1 => local,
            Self::Player2 => Position {
                x: ARENA_WIDTH - local.x,
                y: ARENA_LENGTH - local.y,
            },
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player1 => f.write_str("player1"),
            Self::Player2 => f.write_str("player2"),
        }
    }
}

/// A point in the arena
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn distance(self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Room-unique identifier of a spawned unit or building
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

/// What an attacker is locked onto. Always refers to the enemy side and is
/// re-resolved every tick; a reference to something destroyed is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TargetRef {
    Instance(InstanceId),
    Tower,
}

/// A spawned unit or building
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub card: Arc<CardDefinition>,
    pub hit_points: u32,
    pub position: Position,
    /// Seconds left before a building expires
    pub lifetime: Option<f32>,
    /// Seconds accumulated towards the next generated elixir point
    pub generation_progress: f32,
    pub attack_cooldown: f32,
    pub target: Option<TargetRef>,
}

impl Instance {
    pub fn spawn(id: InstanceId, card: Arc<CardDefinition>, position: Position) -> Self {
        Self {
            id,
            hit_points: card.stats.hit_points,
            position,
            lifetime: card.stats.lifetime,
            generation_progress: 0.0,
            attack_cooldown: 0.0,
            target: None,
            card,
        }
    }

    pub fn category(&self) -> CardCategory {
        self.card.category
    }
}

/// A player's base structure
#[derive(Debug, Clone, PartialEq)]
pub struct Tower {
    pub hit_points: u32,
    pub position: Position,
    pub attack_cooldown: f32,
    pub target: Option<TargetRef>,
}

impl Tower {
    pub fn for_slot(slot: PlayerSlot) -> Self {
        Self {
            hit_points: TOWER_HIT_POINTS,
            position: slot.to_world(Position {
                x: ARENA_WIDTH / 2.0,
                y: TOWER_OFFSET,
            }),
            attack_cooldown: 0.0,
            target: None,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.hit_points == 0
    }
}

/// Authoritative per-player state
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub slot: PlayerSlot,
    pub elixir: u32,
    /// Seconds accumulated towards the next elixir point
    pub elixir_progress: f32,
    pub units: Vec<Instance>,
    pub buildings: Vec<Instance>,
    pub tower: Tower,
}

impl PlayerState {
    pub fn new(slot: PlayerSlot, starting_elixir: u32) -> Self {
        Self {
            slot,
            elixir: starting_elixir,
            elixir_progress: 0.0,
            units: Vec::new(),
            buildings: Vec::new(),
            tower: Tower::for_slot(slot),
        }
    }

    pub fn find(&self, id: InstanceId) -> Option<&Instance> {
        self.units
            .iter()
            .chain(self.buildings.iter())
            .find(|i| i.id == id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.units.iter().chain(self.buildings.iter())
    }
}

/// State of one match, advanced by the simulation engine
#[derive(Debug, Clone)]
pub struct MatchState {
    pub tick: u64,
    pub players: [PlayerState; 2],
    next_instance_id: u32,
}

impl MatchState {
    pub fn new(starting_elixir: u32) -> Self {
        Self {
            tick: 0,
            players: [
                PlayerState::new(PlayerSlot::Player1, starting_elixir),
                PlayerState::new(PlayerSlot::Player2, starting_elixir),
            ],
            next_instance_id: 1,
        }
    }

    pub fn player(&self, slot: PlayerSlot) -> &PlayerState {
        &self.players[slot.index()]
    }

    pub fn player_mut(&mut self, slot: PlayerSlot) -> &mut PlayerState {
        &mut self.players[slot.index()]
    }

    pub fn allocate_instance_id(&mut self) -> InstanceId {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player2_frame_is_mirrored() {
        let local = Position { x: 3.0, y: 4.0 };
        assert_eq!(PlayerSlot::Player1.to_world(local), local);
        assert_eq!(
            PlayerSlot::Player2.to_world(local),
            Position {
                x: ARENA_WIDTH - 3.0,
                y: ARENA_LENGTH - 4.0
            }
        );
    }

    #[test]
    fn towers_face_each_other() {
        let t1 = Tower::for_slot(PlayerSlot::Player1);
        let t2 = Tower::for_slot(PlayerSlot::Player2);
        assert_eq!(t1.position.x, t2.position.x);
        assert!(t1.position.y < t2.position.y);
    }

    #[test]
    fn slot_serializes_as_player_name() {
        assert_eq!(
            serde_json::to_string(&PlayerSlot::Player2).unwrap(),
            "\"player2\""
        );
    }
}
