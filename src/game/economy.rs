//! Elixir economy - accrual and spending

/// Elixir cap; a player never holds more than this
pub const MAX_ELIXIR: u32 = 10;

/// Elixir accrual rules for one room
#[derive(Debug, Clone, Copy)]
pub struct Economy {
    /// Seconds per elixir point
    pub interval: f32,
}

impl Economy {
    pub fn new(interval: f32) -> Self {
        Self { interval }
    }

    /// Advance an accumulator by `dt` and credit every whole interval it covers.
    ///
    /// Used for both the player's base regeneration and generator buildings.
    /// Points are only credited while below [`MAX_ELIXIR`]; a full pool holds
    /// the accumulator at zero so nothing is banked for later.
    pub fn accrue(elixir: &mut u32, progress: &mut f32, dt: f32, interval: f32) -> u32 {
        let mut gained = 0;
        *progress += dt.max(0.0);

        while *progress >= interval && *elixir < MAX_ELIXIR {
            *elixir += 1;
            *progress -= interval;
            gained += 1;
        }

        if *elixir >= MAX_ELIXIR {
            *elixir = MAX_ELIXIR;
            *progress = 0.0;
        }

        gained
    }

    /// Base regeneration for a player's pool
    pub fn regenerate(&self, elixir: &mut u32, progress: &mut f32, dt: f32) -> u32 {
        Self::accrue(elixir, progress, dt, self.interval)
    }

    /// Deduct `cost` if affordable; otherwise leave the pool untouched
    pub fn try_spend(elixir: &mut u32, cost: u32) -> bool {
        match elixir.checked_sub(cost) {
            Some(remaining) => {
                *elixir = remaining;
                true
            }
            None => false,
        }
    }
}
