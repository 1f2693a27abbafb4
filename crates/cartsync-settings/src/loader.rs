//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::SyncSettings;

/// Minimum recommended timer period.
pub const RECOMMENDED_MIN_INTERVAL_MINUTES: u64 = 5;

/// Resolve the path to the settings file (`~/.cartsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cartsync").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<SyncSettings> {
    let defaults = serde_json::to_value(SyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject unusable values; warn on discouraged ones.
pub fn validate(settings: &SyncSettings) -> Result<()> {
    if settings.interval_minutes == 0 {
        return Err(SettingsError::invalid("interval_minutes", "must be at least 1"));
    }
    if settings.interval_minutes < RECOMMENDED_MIN_INTERVAL_MINUTES {
        warn!(
            interval_minutes = settings.interval_minutes,
            "sync interval below the recommended minimum of {RECOMMENDED_MIN_INTERVAL_MINUTES} minutes"
        );
    }
    if settings.bare_domain().is_empty() {
        return Err(SettingsError::invalid("domain", "must not be empty"));
    }
    if !settings.endpoint.starts_with("http://") && !settings.endpoint.starts_with("https://") {
        return Err(SettingsError::invalid(
            "endpoint",
            format!("expected an http(s) URL, got '{}'", settings.endpoint),
        ));
    }
    if settings.remote.command_timeout_ms == 0 || settings.remote.discovery_timeout_ms == 0 {
        return Err(SettingsError::invalid("remote", "timeouts must be non-zero"));
    }
    Ok(())
}

/// Apply `CARTSYNC_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut SyncSettings) {
    apply_overrides_from(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_overrides_from(settings: &mut SyncSettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("CARTSYNC_DOMAIN") {
        settings.domain = v;
    }
    if let Some(v) = string("CARTSYNC_ENDPOINT") {
        settings.endpoint = v;
    }
    if let Some(v) = string("CARTSYNC_STORE_PATH") {
        settings.store_path = v;
    }
    if let Some(v) = string("CARTSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = string("CARTSYNC_INTERVAL_MINUTES") {
        match parse_u64_range(&raw, 1, 1440) {
            Some(v) => settings.interval_minutes = v,
            None => warn!(key = "CARTSYNC_INTERVAL_MINUTES", value = %raw, "invalid interval env var, ignoring"),
        }
    }
    if let Some(raw) = string("CARTSYNC_ADOPT_ANY_PAGE") {
        match parse_bool(&raw) {
            Some(v) => settings.adopt_any_page = v,
            None => warn!(key = "CARTSYNC_ADOPT_ANY_PAGE", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"remote": {"command_timeout_ms": 10, "navigate_settle_ms": 2}});
        let source = serde_json::json!({"remote": {"command_timeout_ms": 99}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["remote"]["command_timeout_ms"], 99);
        assert_eq!(merged["remote"]["navigate_settle_ms"], 2);
    }

    #[test]
    fn merge_skips_null() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s.domain, SyncSettings::default().domain);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"domain": "amazon.co.uk", "interval_minutes": 15, "reconnect": {"max_attempts": 7}}"#,
        )
        .unwrap();
        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.domain, "amazon.co.uk");
        assert_eq!(s.interval_minutes, 15);
        assert_eq!(s.reconnect.max_attempts, 7);
        assert_eq!(s.reconnect.base_delay_ms, 1000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"interval_minutes": 0}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue { field: "interval_minutes", .. })
        );
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn short_interval_is_allowed() {
        let s = SyncSettings {
            interval_minutes: 1,
            ..SyncSettings::default()
        };
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let s = SyncSettings {
            endpoint: "ws://localhost:9222".into(),
            ..SyncSettings::default()
        };
        assert_matches!(validate(&s), Err(SettingsError::InvalidValue { .. }));
    }

    #[test]
    fn empty_domain_is_rejected() {
        let s = SyncSettings {
            domain: "https://www.".into(),
            ..SyncSettings::default()
        };
        assert_matches!(validate(&s), Err(SettingsError::InvalidValue { .. }));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut s = SyncSettings::default();
        apply_overrides_from(
            &mut s,
            &lookup(&[
                ("CARTSYNC_DOMAIN", "amazon.fr"),
                ("CARTSYNC_ENDPOINT", "http://chromium:9222"),
                ("CARTSYNC_INTERVAL_MINUTES", "10"),
                ("CARTSYNC_ADOPT_ANY_PAGE", "yes"),
                ("CARTSYNC_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(s.domain, "amazon.fr");
        assert_eq!(s.endpoint, "http://chromium:9222");
        assert_eq!(s.interval_minutes, 10);
        assert!(s.adopt_any_page);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut s = SyncSettings::default();
        apply_overrides_from(
            &mut s,
            &lookup(&[
                ("CARTSYNC_INTERVAL_MINUTES", "0"),
                ("CARTSYNC_ADOPT_ANY_PAGE", "maybe"),
                ("CARTSYNC_DOMAIN", ""),
            ]),
        );
        assert_eq!(s.interval_minutes, 60);
        assert!(!s.adopt_any_page);
        assert_eq!(s.domain, "amazon.com");
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_u64_range("1440", 1, 1440), Some(1440));
        assert_eq!(parse_u64_range("1441", 1, 1440), None);
        assert_eq!(parse_u64_range("x", 1, 1440), None);
    }
}
