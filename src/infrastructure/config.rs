use crate::infrastructure::error::EngineError;
use chrono_tz::Tz;
use serde_json::Value;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const NOTIFICATIONS_JSON: &str = "notifications.json";

/// Engine settings read from `notifications.json`. Missing fields fall back
/// to defaults so older config files keep working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub delivery_interval_ms: u64,
    pub schedule_interval_ms: u64,
    pub lookahead_minutes: i64,
    pub debounce_ms: u64,
    pub min_tick_interval_ms: u64,
    pub default_lead_minutes: i64,
    pub snooze_minutes: i64,
    pub listen_realtime: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            delivery_interval_ms: 30_000,
            schedule_interval_ms: 60_000,
            lookahead_minutes: 60,
            debounce_ms: 3_000,
            min_tick_interval_ms: 5_000,
            default_lead_minutes: 10,
            snooze_minutes: 5,
            listen_realtime: true,
        }
    }
}

fn default_files() -> Vec<(&'static str, Value)> {
    vec![
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "TimeBlocks",
                "timezone": "UTC"
            }),
        ),
        (
            NOTIFICATIONS_JSON,
            serde_json::json!({
                "schema": 1,
                "deliveryIntervalMs": 30000,
                "scheduleIntervalMs": 60000,
                "lookaheadMinutes": 60,
                "debounceMs": 3000,
                "minTickIntervalMs": 5000,
                "defaultLeadMinutes": 10,
                "snoozeMinutes": 5,
                "listenRealtime": true
            }),
        ),
    ]
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), EngineError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, EngineError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| EngineError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(EngineError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_notification_settings(config_dir: &Path) -> Result<NotificationSettings, EngineError> {
    let raw = read_config(&config_dir.join(NOTIFICATIONS_JSON))?;
    let defaults = NotificationSettings::default();

    let u64_field = |key: &str, default: u64| raw.get(key).and_then(Value::as_u64).unwrap_or(default);
    let i64_field = |key: &str, default: i64| raw.get(key).and_then(Value::as_i64).unwrap_or(default);

    Ok(NotificationSettings {
        delivery_interval_ms: u64_field("deliveryIntervalMs", defaults.delivery_interval_ms),
        schedule_interval_ms: u64_field("scheduleIntervalMs", defaults.schedule_interval_ms),
        lookahead_minutes: i64_field("lookaheadMinutes", defaults.lookahead_minutes),
        debounce_ms: u64_field("debounceMs", defaults.debounce_ms),
        min_tick_interval_ms: u64_field("minTickIntervalMs", defaults.min_tick_interval_ms),
        default_lead_minutes: i64_field("defaultLeadMinutes", defaults.default_lead_minutes),
        snooze_minutes: i64_field("snoozeMinutes", defaults.snooze_minutes),
        listen_realtime: raw
            .get("listenRealtime")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.listen_realtime),
    })
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, EngineError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

/// Parse an IANA timezone name, warning and defaulting to UTC when absent or
/// unknown.
pub fn resolve_timezone(name: Option<&str>) -> Tz {
    match name {
        Some(raw) => match raw.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(timezone = raw, "unknown timezone, falling back to UTC");
                chrono_tz::UTC
            }
        },
        None => chrono_tz::UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_written_once_and_read_back() {
        let dir = tempdir().expect("tempdir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let settings = load_notification_settings(dir.path()).expect("load settings");
        assert_eq!(settings, NotificationSettings::default());
        assert_eq!(
            read_timezone(dir.path()).expect("read timezone"),
            Some("UTC".to_string())
        );

        // Second call must not clobber existing files.
        ensure_default_configs(dir.path()).expect("idempotent");
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(NOTIFICATIONS_JSON),
            "{\"schema\": 1, \"lookaheadMinutes\": 120}\n",
        )
        .expect("write config");

        let settings = load_notification_settings(dir.path()).expect("load settings");
        assert_eq!(settings.lookahead_minutes, 120);
        assert_eq!(settings.debounce_ms, 3_000);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(NOTIFICATIONS_JSON), "{\"schema\": 2}\n")
            .expect("write config");
        assert!(load_notification_settings(dir.path()).is_err());
    }

    #[test]
    fn timezone_resolution_defaults_to_utc() {
        assert_eq!(resolve_timezone(None), chrono_tz::UTC);
        assert_eq!(resolve_timezone(Some("not-a-zone")), chrono_tz::UTC);
        assert_eq!(
            resolve_timezone(Some("America/New_York")),
            chrono_tz::America::New_York
        );
    }
}
