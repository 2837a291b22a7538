//! Default value functions used by serde's `#[serde(default = ...)]`
//! attributes throughout the configuration system.

use super::logging::LogFormat;

pub const fn default_port() -> u16 {
    8080
}

/// `spec.md` §5: "`timer_tick_seconds` ... default 1".
pub const fn default_timer_tick_seconds() -> u64 {
    1
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "impostor-server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
