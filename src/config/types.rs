//! Root configuration shape, per `spec.md` §6 ("Environment / config").

use serde::{Deserialize, Serialize};

use super::defaults::{default_port, default_timer_tick_seconds};
use super::logging::LoggingConfig;
use crate::domain::Settings;

/// Top-level configuration, loaded by [`super::loader::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Tick interval for turn/grace/voting timer tasks; must be positive.
    #[serde(default = "default_timer_tick_seconds")]
    pub timer_tick_seconds: u64,
    #[serde(default)]
    pub redis_room_store: RedisRoomStoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            timer_tick_seconds: default_timer_tick_seconds(),
            redis_room_store: RedisRoomStoreConfig::default(),
        }
    }
}

/// Default room settings applied to newly created rooms. Named after the
/// store that owns them in the original implementation, kept here since
/// this is the only config section that varies per backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisRoomStoreConfig {
    #[serde(default)]
    pub settings: Settings,
}

impl Default for RedisRoomStoreConfig {
    fn default() -> Self {
        Self { settings: Settings::default() }
    }
}
