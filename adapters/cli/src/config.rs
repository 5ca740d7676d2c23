//! TOML configuration loading and validation.

use std::{collections::BTreeSet, fs, path::Path};

use anyhow::{bail, Context, Result};
use raid_helper_core::{Messages, RefreshMode, ScanMode, Settings, UpdateMode, ZoneId};
use serde::Deserialize;
use tracing::warn;

/// Zone monitored when no configuration file is given.
pub(crate) const DEFAULT_ZONE: &str = "overworld";

/// Settings used when no configuration file is given.
pub(crate) fn default_settings() -> Settings {
    Settings {
        zones: vec![ZoneId::new(DEFAULT_ZONE)],
        ..Settings::default()
    }
}

/// Reads and validates the configuration file at `path`.
pub(crate) fn load(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid configuration at {}", path.display()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    zones: Vec<String>,
    world_check_frequency: Option<i64>,
    max_checks_per_tick: Option<i64>,
    raid_check_frequency: Option<i64>,
    bell_work_delay: Option<i64>,
    bell_cooldown: Option<i64>,
    teleport_delay: Option<i64>,
    radius: Option<f64>,
    height_offset: Option<f64>,
    cache_expire_time: Option<i64>,
    max_pool_size: Option<i64>,
    scan_mode: Option<ScanMode>,
    update_mode: Option<UpdateMode>,
    cache_refresh: Option<RefreshMode>,
    #[serde(default)]
    messages: RawMessages,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMessages {
    ring: Option<String>,
    cooldown: Option<String>,
    partial_cooldown: Option<String>,
    success: Option<String>,
}

fn parse(contents: &str) -> Result<Settings> {
    let raw: RawConfig =
        toml::from_str(contents).context("failed to parse configuration toml contents")?;
    let defaults = Settings::default();

    let mut zones = Vec::with_capacity(raw.zones.len());
    let mut seen = BTreeSet::new();
    for name in raw.zones {
        let name = name.trim().to_owned();
        if name.is_empty() {
            bail!("configuration contains a blank zone name");
        }
        if !seen.insert(name.clone()) {
            bail!("configuration lists zone `{name}` more than once");
        }
        zones.push(ZoneId::new(name));
    }
    if zones.is_empty() {
        bail!("configuration monitors no zones");
    }

    let message_defaults = defaults.messages.clone();
    let messages = Messages {
        ring: raw.messages.ring.unwrap_or(message_defaults.ring),
        cooldown: raw.messages.cooldown.unwrap_or(message_defaults.cooldown),
        partial_cooldown: raw
            .messages
            .partial_cooldown
            .unwrap_or(message_defaults.partial_cooldown),
        success: raw.messages.success.unwrap_or(message_defaults.success),
    };

    Ok(Settings {
        zones,
        world_check_frequency: count(
            "world_check_frequency",
            raw.world_check_frequency,
            defaults.world_check_frequency,
        ),
        max_checks_per_tick: count(
            "max_checks_per_tick",
            raw.max_checks_per_tick,
            defaults.max_checks_per_tick,
        ),
        raid_check_frequency: count(
            "raid_check_frequency",
            raw.raid_check_frequency,
            defaults.raid_check_frequency,
        ),
        bell_work_delay: count("bell_work_delay", raw.bell_work_delay, defaults.bell_work_delay),
        bell_cooldown: count("bell_cooldown", raw.bell_cooldown, defaults.bell_cooldown),
        teleport_delay: count("teleport_delay", raw.teleport_delay, defaults.teleport_delay),
        radius: distance("radius", raw.radius, defaults.radius),
        height_offset: distance("height_offset", raw.height_offset, defaults.height_offset),
        cache_expire_time: count(
            "cache_expire_time",
            raw.cache_expire_time,
            defaults.cache_expire_time,
        ),
        max_pool_size: count("max_pool_size", raw.max_pool_size, defaults.max_pool_size),
        scan_mode: raw.scan_mode.unwrap_or(defaults.scan_mode),
        update_mode: raw.update_mode.unwrap_or(defaults.update_mode),
        cache_refresh: raw.cache_refresh.unwrap_or(defaults.cache_refresh),
        messages,
    })
}

/// Converts a non-negative integer setting, falling back to `default` when
/// the value is negative or out of range.
fn count<T>(key: &str, value: Option<i64>, default: T) -> T
where
    T: TryFrom<i64> + Copy + std::fmt::Display,
{
    let Some(value) = value else {
        return default;
    };
    match T::try_from(value) {
        Ok(converted) => converted,
        Err(_) => {
            warn!(key, value, %default, "out of range setting; using default");
            default
        }
    }
}

/// Accepts a finite, non-negative distance, falling back to `default`.
fn distance(key: &str, value: Option<f64>, default: f64) -> f64 {
    match value {
        None => default,
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(value) => {
            warn!(key, value, default, "invalid distance setting; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let settings = parse(r#"zones = ["overworld"]"#).expect("config should parse");
        assert_eq!(settings, default_settings());
    }

    #[test]
    fn empty_zone_list_is_rejected() {
        assert!(parse("zones = []").is_err());
        assert!(parse("radius = 10.0").is_err());
    }

    #[test]
    fn duplicate_and_blank_zones_are_rejected() {
        assert!(parse(r#"zones = ["a", "a"]"#).is_err());
        assert!(parse(r#"zones = ["a", "  "]"#).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = parse(
            r#"
            zones = ["overworld"]
            bell_delay = 5
            "#,
        );
        assert!(result.is_err(), "unknown keys must be rejected");
    }

    #[test]
    fn negative_and_non_finite_values_fall_back_to_defaults() {
        let settings = parse(
            r#"
            zones = ["overworld"]
            bell_cooldown = -3
            max_checks_per_tick = -1
            radius = nan
            height_offset = -2.5
            teleport_delay = 15
            "#,
        )
        .expect("config should parse");

        let defaults = Settings::default();
        assert_eq!(settings.bell_cooldown, defaults.bell_cooldown);
        assert_eq!(settings.max_checks_per_tick, defaults.max_checks_per_tick);
        assert_eq!(settings.radius, defaults.radius);
        assert_eq!(settings.height_offset, defaults.height_offset);
        assert_eq!(settings.teleport_delay, 15);
    }

    #[test]
    fn modes_and_messages_are_read() {
        let settings = parse(
            r#"
            zones = ["overworld", "nether"]
            scan_mode = "both"
            update_mode = "batched"
            cache_refresh = "background"

            [messages]
            success = "Here they come."
            "#,
        )
        .expect("config should parse");

        assert_eq!(settings.zones.len(), 2);
        assert_eq!(settings.scan_mode, ScanMode::Both);
        assert_eq!(settings.update_mode, UpdateMode::Batched);
        assert_eq!(settings.cache_refresh, RefreshMode::Background);
        assert_eq!(settings.messages.success, "Here they come.");
        assert_eq!(settings.messages.ring, Messages::default().ring);
    }

    #[test]
    fn oversized_delay_falls_back_to_default() {
        let settings = parse(
            r#"
            zones = ["overworld"]
            bell_work_delay = 99999999999
            "#,
        )
        .expect("config should parse");
        assert_eq!(settings.bell_work_delay, Settings::default().bell_work_delay);
    }
}
