//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Optional JSON card catalog; the built-in set is used when absent
    pub card_catalog_path: Option<PathBuf>,
    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Capacity of each connection's outbound message queue
    pub outbound_queue_capacity: usize,
    /// Per-room simulation settings
    pub game: GameConfig,
}

/// Settings every room is created with
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    /// Simulation ticks per second (1..=128)
    pub tick_rate_hz: u32,
    /// Time to accrue one elixir point
    pub elixir_interval: Duration,
    /// Elixir each player starts a match with
    pub starting_elixir: u32,
    /// Capacity of a room's pending-input queue
    pub input_queue_capacity: usize,
}

impl GameConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Wall-clock length of one tick
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            elixir_interval: Duration::from_millis(2800),
            starting_elixir: 5,
            input_queue_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".to_string())
        };

        let defaults = GameConfig::default();
        let tick_rate_hz = parse_var("TICK_RATE_HZ", defaults.tick_rate_hz)?;
        if tick_rate_hz == 0 || tick_rate_hz > GameConfig::MAX_TICK_RATE_HZ {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }

        let elixir_interval_ms: u64 = parse_var(
            "ELIXIR_INTERVAL_MS",
            defaults.elixir_interval.as_millis() as u64,
        )?;
        if elixir_interval_ms == 0 {
            return Err(ConfigError::Invalid("ELIXIR_INTERVAL_MS"));
        }

        let starting_elixir = parse_var("STARTING_ELIXIR", defaults.starting_elixir)?;
        if starting_elixir > crate::game::economy::MAX_ELIXIR {
            return Err(ConfigError::Invalid("STARTING_ELIXIR"));
        }

        let input_queue_capacity =
            parse_var("INPUT_QUEUE_CAPACITY", defaults.input_queue_capacity)?;
        let outbound_queue_capacity = parse_var("OUTBOUND_QUEUE_CAPACITY", 128usize)?;
        if input_queue_capacity == 0 {
            return Err(ConfigError::Invalid("INPUT_QUEUE_CAPACITY"));
        }
        if outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid("OUTBOUND_QUEUE_CAPACITY"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            card_catalog_path: env::var("CARD_CATALOG_PATH").ok().map(PathBuf::from),

            input_rate_limit: parse_var(
                "INPUT_RATE_LIMIT",
                crate::util::rate_limit::INPUT_RATE_LIMIT,
            )?,
            outbound_queue_capacity,

            game: GameConfig {
                tick_rate_hz,
                elixir_interval: Duration::from_millis(elixir_interval_ms),
                starting_elixir,
                input_queue_capacity,
            },
        })
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME_VARS: [&str; 5] = [
        "TICK_RATE_HZ",
        "ELIXIR_INTERVAL_MS",
        "STARTING_ELIXIR",
        "INPUT_QUEUE_CAPACITY",
        "OUTBOUND_QUEUE_CAPACITY",
    ];

    fn clear_game_vars() {
        for name in GAME_VARS {
            env::remove_var(name);
        }
    }

    // One test owns the process environment so the cases can't interleave
    #[test]
    fn from_env_validates_game_settings() {
        clear_game_vars();

        env::set_var("TICK_RATE_HZ", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid("TICK_RATE_HZ"))));
        env::set_var("TICK_RATE_HZ", "129");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid("TICK_RATE_HZ"))));
        env::set_var("TICK_RATE_HZ", "fast");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid("TICK_RATE_HZ"))));
        env::set_var("TICK_RATE_HZ", "128");

        env::set_var("STARTING_ELIXIR", "11");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("STARTING_ELIXIR"))
        ));
        env::set_var("STARTING_ELIXIR", "10");

        env::set_var("ELIXIR_INTERVAL_MS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ELIXIR_INTERVAL_MS"))
        ));
        env::set_var("ELIXIR_INTERVAL_MS", "1500");

        let config = Config::from_env().expect("valid settings");
        assert_eq!(config.game.tick_rate_hz, 128);
        assert_eq!(config.game.starting_elixir, 10);
        assert_eq!(config.game.elixir_interval, Duration::from_millis(1500));
        assert_eq!(config.game.input_queue_capacity, 64);

        clear_game_vars();
        assert_eq!(Config::from_env().expect("defaults").game, GameConfig::default());
    }

    #[test]
    fn tick_interval_matches_rate() {
        let config = GameConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_micros(33_333));

        let fast = GameConfig {
            tick_rate_hz: 100,
            ..GameConfig::default()
        };
        assert_eq!(fast.tick_interval(), Duration::from_millis(10));
    }
}
