//! Configuration module.
//!
//! Layered loading with sensible defaults, per `spec.md` §6:
//! - `config.yaml` files (CWD, then exe-adjacent)
//! - `IMPOSTOR_CONFIG_JSON` / `IMPOSTOR_CONFIG_PATH` env vars
//! - flat `IMPOSTOR__SECTION__KEY` env overrides
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod types;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use types::{Config, RedisRoomStoreConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.timer_tick_seconds, 1);
        assert_eq!(config.redis_room_store.settings.max_players, 8);
        assert_eq!(config.redis_room_store.settings.turn_duration, 30);
        assert_eq!(config.redis_room_store.settings.round_time, 60);
        assert_eq!(config.redis_room_store.settings.turn_grace, 60);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.timer_tick_seconds, deserialized.timer_tick_seconds);
        assert_eq!(
            config.redis_room_store.settings,
            deserialized.redis_room_store.settings
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_log_level_as_str() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }
}

