//! Snapshot building for network transmission

use crate::ws::protocol::{GameEvent, InstanceView, PlayerStateView, ServerMsg, TowerView};

use super::state::{Instance, MatchState, PlayerSlot, PlayerState};

/// Builds per-player snapshots from one post-tick state
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Serializable view of one player's state
    pub fn view(player: &PlayerState, elixir_interval: f32) -> PlayerStateView {
        PlayerStateView {
            player: player.slot,
            elixir: player.elixir,
            elixir_progress: (player.elixir_progress / elixir_interval).clamp(0.0, 1.0),
            units: player.units.iter().map(instance_view).collect(),
            buildings: player.buildings.iter().map(instance_view).collect(),
            tower: TowerView {
                hit_points: player.tower.hit_points,
                x: player.tower.position.x,
                y: player.tower.position.y,
            },
        }
    }

    /// Build the `game_state` message for each slot, indexed by
    /// [`PlayerSlot::index`]. Both messages are cut from the same pair of
    /// views, so player1's `opponent` is exactly player2's `you`.
    pub fn build(
        state: &MatchState,
        elixir_interval: f32,
        events: Vec<GameEvent>,
    ) -> [ServerMsg; 2] {
        let views = [
            Self::view(state.player(PlayerSlot::Player1), elixir_interval),
            Self::view(state.player(PlayerSlot::Player2), elixir_interval),
        ];

        PlayerSlot::BOTH.map(|slot| ServerMsg::GameState {
            tick: state.tick,
            you: views[slot.index()].clone(),
            opponent: views[slot.opponent().index()].clone(),
            events: events.clone(),
        })
    }
}

fn instance_view(instance: &Instance) -> InstanceView {
    InstanceView {
        id: instance.id,
        card_id: instance.card.id.clone(),
        hit_points: instance.hit_points,
        x: instance.position.x,
        y: instance.position.y,
        lifetime: instance.lifetime,
        target: instance.target,
    }
}
