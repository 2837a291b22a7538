//! Request-body validation, grounded in the teacher's `protocol::validation`
//! `_with_config` validator pattern (bounds sourced from `spec.md` §3).

use super::error::ServiceError;
use super::types::Settings;
use std::collections::BTreeMap;

const NICKNAME_MIN: usize = 1;
const NICKNAME_MAX: usize = 20;

pub fn validate_nickname(nickname: &str) -> Result<(), ServiceError> {
    let len = nickname.chars().count();
    if len < NICKNAME_MIN || len > NICKNAME_MAX {
        return Err(ServiceError::Validation(format!(
            "nickname must be {NICKNAME_MIN}-{NICKNAME_MAX} characters"
        )));
    }
    Ok(())
}

pub fn validate_room_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("name cannot be empty".into()));
    }
    Ok(())
}

/// Validate a partial settings update (only the keys present are checked),
/// returning the raw string map `RoomStore::set_room_settings` expects.
pub fn validate_settings_partial(
    max_players: Option<u32>,
    turn_duration: Option<u64>,
    round_time: Option<u64>,
) -> Result<BTreeMap<String, String>, ServiceError> {
    let mut raw = BTreeMap::new();

    if let Some(value) = max_players {
        let (min, max) = Settings::MAX_PLAYERS_BOUNDS;
        if value < min || value > max {
            return Err(ServiceError::Validation(format!(
                "max_players must be between {min} and {max}"
            )));
        }
        raw.insert("max_players".to_string(), value.to_string());
    }

    if let Some(value) = turn_duration {
        let (min, max) = Settings::TURN_DURATION_BOUNDS;
        if value < min || value > max {
            return Err(ServiceError::Validation(format!(
                "turn_duration must be between {min} and {max}"
            )));
        }
        raw.insert("turn_duration".to_string(), value.to_string());
    }

    if let Some(value) = round_time {
        let (min, max) = Settings::ROUND_TIME_BOUNDS;
        if value < min || value > max {
            return Err(ServiceError::Validation(format!(
                "round_time must be between {min} and {max}"
            )));
        }
        raw.insert("round_time".to_string(), value.to_string());
    }

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_bounds() {
        assert!(validate_nickname("a").is_ok());
        assert!(validate_nickname(&"a".repeat(20)).is_ok());
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname(&"a".repeat(21)).is_err());
    }

    #[test]
    fn settings_bounds_reject_out_of_range() {
        assert!(validate_settings_partial(Some(1), None, None).is_err());
        assert!(validate_settings_partial(Some(21), None, None).is_err());
        assert!(validate_settings_partial(None, Some(4), None).is_err());
        assert!(validate_settings_partial(None, Some(301), None).is_err());
        assert!(validate_settings_partial(None, None, Some(9)).is_err());
        assert!(validate_settings_partial(Some(8), Some(30), Some(60)).is_ok());
    }
}
