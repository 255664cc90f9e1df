//! Time utilities for game simulation

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Overruns are absorbed up to this many tick intervals; anything longer is dropped
pub const MAX_DT_TICKS: u32 = 2;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Convert measured wall time between two ticks into simulation `dt` (seconds).
///
/// A late tick still advances the simulation, but by no more than
/// [`MAX_DT_TICKS`] intervals, so a stalled room never replays a burst.
pub fn clamp_dt(elapsed: Duration, tick_interval: Duration) -> f32 {
    elapsed.min(tick_interval * MAX_DT_TICKS).as_secs_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_dt_passes_normal_ticks_through() {
        let tick = Duration::from_millis(33);
        let dt = clamp_dt(Duration::from_millis(30), tick);
        assert!((dt - 0.030).abs() < 1e-6);
    }

    #[test]
    fn clamp_dt_caps_long_stalls() {
        let tick = Duration::from_millis(33);
        let dt = clamp_dt(Duration::from_secs(5), tick);
        assert!((dt - 0.066).abs() < 1e-6);
    }
}
