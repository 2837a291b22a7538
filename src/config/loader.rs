//! Configuration loading and environment parsing.

use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load configuration with the following precedence (highest first):
/// 1) `IMPOSTOR_CONFIG_JSON` env var containing raw JSON
/// 2) File pointed by `IMPOSTOR_CONFIG_PATH` env var
/// 3) `config.yaml` in the current working directory
/// 4) `config.yaml` next to the executable (application directory)
/// 5) Defaults compiled into the binary
///
/// Additionally, individual fields can be overridden by environment
/// variables with prefix `IMPOSTOR` using `__` as a nested separator, e.g.
/// `IMPOSTOR__PORT=9090` or `IMPOSTOR__LOGGING__LEVEL=debug`. `REDIS_URL` is
/// read directly by `main`, not through this layer (`spec.md` §6).
///
/// Any errors while reading/parsing are printed to stderr and defaults for
/// that source are used; `load()` always returns a `Config`.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    // 1) Inline JSON via env var
    if let Ok(json) = env::var("IMPOSTOR_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "IMPOSTOR_CONFIG_JSON") {
            merge_values(&mut merged, value);
        }
    }

    // 2) Explicit path via env var
    if let Ok(path) = env::var("IMPOSTOR_CONFIG_PATH") {
        merge_yaml_source(&mut merged, &PathBuf::from(path));
    }

    // 3) config.yaml in CWD
    merge_yaml_source(&mut merged, &PathBuf::from("config.yaml"));

    // 4) config.yaml next to executable
    if let Ok(exe_path) = env::current_exe() {
        if let Some(mut exe_dir) = exe_path.parent().map(std::path::Path::to_path_buf) {
            exe_dir.push("config.yaml");
            merge_yaml_source(&mut merged, &exe_dir);
        }
    }

    // Environment overrides with prefix IMPOSTOR and nested separator __
    apply_env_overrides(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_yaml_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => merge_values(target, value),
            Err(err) => eprintln!("Failed to parse config file {}: {}", path.display(), err),
        },
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("IMPOSTOR__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_env_value(&raw_value);
        set_nested_value(root, &segments, value);
    }
}

fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        let items = trimmed
            .split(',')
            .map(|segment| parse_scalar(segment.trim()))
            .collect::<Vec<_>>();
        return Value::Array(items);
    }

    parse_scalar(trimmed)
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *target = value;
        return;
    }

    if segments.len() == 1 {
        let map = ensure_object(target);
        #[allow(clippy::indexing_slicing)]
        map.insert(segments[0].clone(), value);
        return;
    }

    let map = ensure_object(target);
    #[allow(clippy::indexing_slicing)]
    let key = segments[0].clone();
    let entry = map
        .entry(key)
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    #[allow(clippy::indexing_slicing)]
    let rest = &segments[1..];
    set_nested_value(entry, rest, value);
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_serde_json() {
        let defaults = Config::default();
        let value = serde_json::to_value(&defaults).unwrap();
        let back: Config = serde_json::from_value(value).unwrap();
        assert_eq!(back.port, defaults.port);
        assert_eq!(back.timer_tick_seconds, defaults.timer_tick_seconds);
    }

    #[test]
    fn env_override_sets_nested_field() {
        let mut merged = serde_json::to_value(Config::default()).unwrap();
        set_nested_value(
            &mut merged,
            &["logging".to_string(), "level".to_string()],
            Value::String("debug".to_string()),
        );
        assert_eq!(merged["logging"]["level"], "debug");
    }
}
