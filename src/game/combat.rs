//! Combat system - targeting, attack cadence, damage

use super::physics::PhysicsSystem;
use super::state::{InstanceId, PlayerSlot, PlayerState, Position, TargetRef};

/// A hit decided during a tick, applied once every attacker has acted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Side that receives the damage
    pub victim: PlayerSlot,
    pub target: TargetRef,
    pub damage: u32,
}

/// Attack stats of anything that can fight
#[derive(Debug, Clone, Copy)]
pub struct AttackProfile {
    pub damage: u32,
    pub range: f32,
    pub interval: f32,
}

/// Combat rules. Attacks are discrete hits: an attacker with a target in
/// range strikes whenever its cooldown reaches zero, then waits `interval`.
pub struct CombatSystem;

impl CombatSystem {
    /// Where a target currently is, or `None` if it no longer exists
    pub fn target_position(enemy: &PlayerState, target: TargetRef) -> Option<Position> {
        match target {
            TargetRef::Instance(id) => enemy.find(id).map(|i| i.position),
            TargetRef::Tower if !enemy.tower.is_destroyed() => Some(enemy.tower.position),
            TargetRef::Tower => None,
        }
    }

    /// Whether `target` still exists and is within `range` of `from`
    pub fn is_engaged(from: Position, range: f32, enemy: &PlayerState, target: TargetRef) -> bool {
        Self::target_position(enemy, target)
            .map(|pos| PhysicsSystem::in_range(from, pos, range))
            .unwrap_or(false)
    }

    /// Choose a target for an attacker at `from`.
    ///
    /// The current target is kept while it exists and is in range. Otherwise
    /// the nearest enemy instance in range is chosen (lowest id on ties),
    /// falling back to the enemy tower if it is in range.
    pub fn select_target(
        from: Position,
        range: f32,
        current: Option<TargetRef>,
        enemy: &PlayerState,
    ) -> Option<TargetRef> {
        if let Some(target) = current {
            if Self::is_engaged(from, range, enemy, target) {
                return Some(target);
            }
        }

        let mut best: Option<(f32, InstanceId)> = None;
        for instance in enemy.instances() {
            let dist = from.distance(instance.position);
            if dist > range {
                continue;
            }
            let closer = match best {
                None => true,
                Some((best_dist, best_id)) => {
                    dist < best_dist || (dist == best_dist && instance.id < best_id)
                }
            };
            if closer {
                best = Some((dist, instance.id));
            }
        }

        if let Some((_, id)) = best {
            return Some(TargetRef::Instance(id));
        }

        if !enemy.tower.is_destroyed()
            && PhysicsSystem::in_range(from, enemy.tower.position, range)
        {
            return Some(TargetRef::Tower);
        }

        None
    }

    /// Tick down a cooldown
    pub fn update_cooldown(cooldown: f32, dt: f32) -> f32 {
        (cooldown - dt).max(0.0)
    }

    /// Run one attacker for this tick. Updates its target and cooldown and
    /// returns the hit it lands, if any.
    pub fn engage(
        position: Position,
        profile: AttackProfile,
        cooldown: &mut f32,
        target: &mut Option<TargetRef>,
        enemy: &PlayerState,
        dt: f32,
    ) -> Option<Hit> {
        *cooldown = Self::update_cooldown(*cooldown, dt);

        if profile.damage == 0 {
            *target = None;
            return None;
        }

        *target = Self::select_target(position, profile.range, *target, enemy);
        let locked = (*target)?;

        if *cooldown > 0.0 {
            return None;
        }

        *cooldown = profile.interval;
        Some(Hit {
            victim: enemy.slot,
            target: locked,
            damage: profile.damage,
        })
    }

    /// Apply damage to hit points, returns (new_hit_points, is_dead)
    pub fn apply_damage(hit_points: u32, damage: u32) -> (u32, bool) {
        let remaining = hit_points.saturating_sub(damage);
        (remaining, remaining == 0)
    }
}
