//! Unit movement and arena geometry

use super::state::{PlayerSlot, Position, ARENA_LENGTH, ARENA_WIDTH};

/// Movement and placement rules
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Move `from` towards `goal` by at most `step`, never overshooting
    pub fn advance_towards(from: Position, goal: Position, step: f32) -> Position {
        let dx = goal.x - from.x;
        let dy = goal.y - from.y;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist <= step || dist < 0.001 {
            return goal;
        }

        let scale = step / dist;
        Self::clamp_to_arena(Position {
            x: from.x + dx * scale,
            y: from.y + dy * scale,
        })
    }

    /// Check if `target` is within `range` of `from`
    pub fn in_range(from: Position, target: Position, range: f32) -> bool {
        from.distance(target) <= range
    }

    /// Convert a placement given in the player's own frame into world
    /// coordinates, clamped to that player's half of the arena.
    /// Returns `None` for non-finite coordinates.
    pub fn deploy_position(slot: PlayerSlot, local: Position) -> Option<Position> {
        if !local.x.is_finite() || !local.y.is_finite() {
            return None;
        }

        let clamped = Position {
            x: local.x.clamp(0.0, ARENA_WIDTH),
            y: local.y.clamp(0.0, ARENA_LENGTH / 2.0),
        };
        Some(slot.to_world(clamped))
    }

    fn clamp_to_arena(p: Position) -> Position {
        Position {
            x: p.x.clamp(0.0, ARENA_WIDTH),
            y: p.y.clamp(0.0, ARENA_LENGTH),
        }
    }
}
