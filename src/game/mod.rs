//! Game simulation modules

pub mod catalog;
pub mod combat;
pub mod economy;
pub mod engine;
pub mod physics;
pub mod room;
pub mod snapshot;
pub mod state;

pub use catalog::CardCatalog;
pub use engine::SimulationEngine;
pub use room::RoomRegistry;
pub use state::PlayerSlot;

use state::Position;

/// A `play_card` request queued for a room's next tick
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInput {
    pub slot: PlayerSlot,
    pub card_id: String,
    /// Deploy point in the player's own frame
    pub placement: Position,
    pub received_at: u64,
}
