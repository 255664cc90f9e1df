//! Simulation engine - advances a match by one tick
//!
//! Each tick runs the same fixed sequence so identical inputs always produce
//! identical states:
//!
//! 1. input resolution (card plays)
//! 2. elixir accrual
//! 3. building generation and lifetime
//! 4. unit movement
//! 5. targeting and combat
//! 6. win condition
//!
//! Bad inputs are logged and dropped; nothing in here fails a tick.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::GameConfig;
use crate::ws::protocol::{DestroyCause, GameEvent};

use super::catalog::{CardCatalog, CardCategory};
use super::combat::{AttackProfile, CombatSystem, Hit};
use super::economy::Economy;
use super::physics::PhysicsSystem;
use super::state::{
    Instance, InstanceId, MatchState, PlayerSlot, PlayerState, TargetRef, TOWER_ATTACK_INTERVAL,
    TOWER_DAMAGE, TOWER_RANGE,
};
use super::PlayerInput;

/// How a match was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Winner(PlayerSlot),
    Draw,
}

/// Everything a tick produced besides the new state
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<GameEvent>,
    /// Set once the win condition is met; the room must terminate
    pub result: Option<MatchResult>,
}

/// Reasons an input is ignored
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("unknown card id: {0}")]
    UnknownCard(String),

    #[error("placement is not a finite position")]
    InvalidPlacement,

    #[error("card costs {cost} but only {available} elixir available")]
    InsufficientElixir { cost: u32, available: u32 },
}

/// Stateless rules engine shared by a room for its whole lifetime
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    catalog: Arc<CardCatalog>,
    economy: Economy,
}

impl SimulationEngine {
    pub fn new(catalog: Arc<CardCatalog>, config: &GameConfig) -> Self {
        Self {
            catalog,
            economy: Economy::new(config.elixir_interval.as_secs_f32()),
        }
    }

    pub fn elixir_interval(&self) -> f32 {
        self.economy.interval
    }

    /// Advance `state` by `dt` seconds, applying `inputs` in order
    pub fn step(&self, state: &mut MatchState, dt: f32, inputs: Vec<PlayerInput>) -> TickOutcome {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut events = Vec::new();
        state.tick += 1;

        for input in &inputs {
            match self.resolve_input(state, input) {
                Ok(event) => events.push(event),
                Err(e @ InputError::InsufficientElixir { .. }) => {
                    debug!(
                        tick = state.tick,
                        player = %input.slot,
                        received_at = input.received_at,
                        error = %e,
                        "Input dropped"
                    );
                }
                Err(e) => {
                    warn!(
                        tick = state.tick,
                        player = %input.slot,
                        received_at = input.received_at,
                        error = %e,
                        "Rejected input"
                    );
                }
            }
        }

        self.accrue_elixir(state, dt);
        self.update_buildings(state, dt, &mut events);
        self.move_units(state, dt);
        self.resolve_combat(state, dt, &mut events);
        let result = self.check_win_condition(state, &mut events);

        TickOutcome { events, result }
    }

    /// Spend elixir and spawn the card's instance, or explain why not
    fn resolve_input(
        &self,
        state: &mut MatchState,
        input: &PlayerInput,
    ) -> Result<GameEvent, InputError> {
        let card = self
            .catalog
            .get(&input.card_id)
            .cloned()
            .ok_or_else(|| InputError::UnknownCard(input.card_id.clone()))?;

        let position = PhysicsSystem::deploy_position(input.slot, input.placement)
            .ok_or(InputError::InvalidPlacement)?;

        let available = state.player(input.slot).elixir;
        if available < card.cost {
            return Err(InputError::InsufficientElixir {
                cost: card.cost,
                available,
            });
        }

        let id = state.allocate_instance_id();
        let player = state.player_mut(input.slot);
        Economy::try_spend(&mut player.elixir, card.cost);

        let event = GameEvent::Spawned {
            owner: input.slot,
            instance_id: id,
            card_id: card.id.clone(),
            x: position.x,
            y: position.y,
        };

        let instance = Instance::spawn(id, card, position);
        match instance.category() {
            CardCategory::Unit => player.units.push(instance),
            CardCategory::Building => player.buildings.push(instance),
        }

        Ok(event)
    }

    fn accrue_elixir(&self, state: &mut MatchState, dt: f32) {
        for player in state.players.iter_mut() {
            self.economy
                .regenerate(&mut player.elixir, &mut player.elixir_progress, dt);
        }
    }

    /// Generator buildings pay out, then every building ages
    fn update_buildings(&self, state: &mut MatchState, dt: f32, events: &mut Vec<GameEvent>) {
        let mut expired = Vec::new();

        for player in state.players.iter_mut() {
            let PlayerState {
                slot,
                elixir,
                buildings,
                ..
            } = player;

            for building in buildings.iter_mut() {
                if let Some(interval) = building.card.stats.generation_interval {
                    Economy::accrue(elixir, &mut building.generation_progress, dt, interval);
                }
                if let Some(lifetime) = building.lifetime.as_mut() {
                    *lifetime -= dt;
                }
            }

            buildings.retain(|b| {
                let alive = b.lifetime.map_or(true, |l| l > 0.0);
                if !alive {
                    expired.push(b.id);
                    events.push(GameEvent::Destroyed {
                        owner: *slot,
                        instance_id: b.id,
                        cause: DestroyCause::Expired,
                    });
                }
                alive
            });
        }

        clear_targets(state, &expired);
    }

    /// Units that aren't fighting walk towards the enemy tower
    fn move_units(&self, state: &mut MatchState, dt: f32) {
        for slot in PlayerSlot::BOTH {
            let (own, enemy) = split_players(&mut state.players, slot);
            let goal = enemy.tower.position;

            for unit in own.units.iter_mut() {
                let range = unit.card.stats.range;
                let engaged = unit
                    .target
                    .map_or(false, |t| CombatSystem::is_engaged(unit.position, range, enemy, t));
                if engaged {
                    continue;
                }

                unit.target = None;
                let speed = unit.card.stats.speed.unwrap_or(0.0);
                unit.position = PhysicsSystem::advance_towards(unit.position, goal, speed * dt);
            }
        }
    }

    /// Every attacker picks a target and maybe strikes; all hits are decided
    /// against the same pre-damage state before any is applied.
    fn resolve_combat(&self, state: &mut MatchState, dt: f32, events: &mut Vec<GameEvent>) {
        let mut hits: Vec<Hit> = Vec::new();

        for slot in PlayerSlot::BOTH {
            let (own, enemy) = split_players(&mut state.players, slot);

            for instance in own.units.iter_mut().chain(own.buildings.iter_mut()) {
                let stats = &instance.card.stats;
                let profile = AttackProfile {
                    damage: stats.damage,
                    range: stats.range,
                    interval: stats.attack_interval,
                };
                let hit = CombatSystem::engage(
                    instance.position,
                    profile,
                    &mut instance.attack_cooldown,
                    &mut instance.target,
                    enemy,
                    dt,
                );
                hits.extend(hit);
            }

            if !own.tower.is_destroyed() {
                let tower = &mut own.tower;
                let profile = AttackProfile {
                    damage: TOWER_DAMAGE,
                    range: TOWER_RANGE,
                    interval: TOWER_ATTACK_INTERVAL,
                };
                let hit = CombatSystem::engage(
                    tower.position,
                    profile,
                    &mut tower.attack_cooldown,
                    &mut tower.target,
                    enemy,
                    dt,
                );
                hits.extend(hit);
            }
        }

        for hit in hits {
            let victim = state.player_mut(hit.victim);
            match hit.target {
                TargetRef::Instance(id) => {
                    if let Some(target) = victim
                        .units
                        .iter_mut()
                        .chain(victim.buildings.iter_mut())
                        .find(|i| i.id == id)
                    {
                        target.hit_points =
                            CombatSystem::apply_damage(target.hit_points, hit.damage).0;
                    }
                }
                TargetRef::Tower => {
                    victim.tower.hit_points =
                        CombatSystem::apply_damage(victim.tower.hit_points, hit.damage).0;
                }
            }
        }

        let mut killed = Vec::new();
        for player in state.players.iter_mut() {
            let slot = player.slot;
            let mut remove_dead = |instances: &mut Vec<Instance>| {
                instances.retain(|i| {
                    let alive = i.hit_points > 0;
                    if !alive {
                        killed.push(i.id);
                        events.push(GameEvent::Destroyed {
                            owner: slot,
                            instance_id: i.id,
                            cause: DestroyCause::Killed,
                        });
                    }
                    alive
                });
            };
            remove_dead(&mut player.units);
            remove_dead(&mut player.buildings);
        }

        clear_targets(state, &killed);
    }

    fn check_win_condition(
        &self,
        state: &mut MatchState,
        events: &mut Vec<GameEvent>,
    ) -> Option<MatchResult> {
        let fallen: Vec<PlayerSlot> = state
            .players
            .iter()
            .filter(|p| p.tower.is_destroyed())
            .map(|p| p.slot)
            .collect();

        for owner in &fallen {
            events.push(GameEvent::TowerDestroyed { owner: *owner });
        }

        match fallen.as_slice() {
            [] => None,
            [loser] => Some(MatchResult::Winner(loser.opponent())),
            _ => Some(MatchResult::Draw),
        }
    }
}

/// Borrow `slot`'s state mutably alongside its opponent's
fn split_players(
    players: &mut [PlayerState; 2],
    slot: PlayerSlot,
) -> (&mut PlayerState, &PlayerState) {
    let [first, second] = players;
    match slot {
        PlayerSlot::Player1 => (first, second),
        PlayerSlot::Player2 => (second, first),
    }
}

/// Drop every target reference pointing at a removed instance
fn clear_targets(state: &mut MatchState, removed: &[InstanceId]) {
    if removed.is_empty() {
        return;
    }

    let points_at_removed = |target: &Option<TargetRef>| {
        matches!(target, Some(TargetRef::Instance(id)) if removed.contains(id))
    };

    for player in state.players.iter_mut() {
        for instance in player.units.iter_mut().chain(player.buildings.iter_mut()) {
            if points_at_removed(&instance.target) {
                instance.target = None;
            }
        }
        if points_at_removed(&player.tower.target) {
            player.tower.target = None;
        }
    }
}
