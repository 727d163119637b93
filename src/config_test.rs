#![allow(clippy::float_cmp)]

use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_lookup_yields_defaults() {
    let config = SyncConfig::from_lookup(|_| None);
    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.throttle_interval, Duration::from_millis(16));
    assert_eq!(config.history_capacity, 50);
    assert_eq!(config.delta_ttl, Duration::from_millis(5_000));
    assert_eq!(config.paste_offset, 20.0);
    assert_eq!(config.default_fill, "#3B82F6");
    assert_eq!(config.default_size, 100.0);
}

#[test]
fn values_override_defaults() {
    let config = SyncConfig::from_lookup(lookup_from(&[
        ("SCENESYNC_THROTTLE_MS", "33"),
        ("SCENESYNC_HISTORY_CAPACITY", "10"),
        ("SCENESYNC_DELTA_TTL_MS", " 250 "),
        ("SCENESYNC_PASTE_OFFSET", "12.5"),
        ("SCENESYNC_DEFAULT_FILL", "#FF0000"),
        ("SCENESYNC_CHANNEL_CAPACITY", "8"),
    ]));
    assert_eq!(config.throttle_interval, Duration::from_millis(33));
    assert_eq!(config.history_capacity, 10);
    assert_eq!(config.delta_ttl, Duration::from_millis(250));
    assert_eq!(config.paste_offset, 12.5);
    assert_eq!(config.default_fill, "#FF0000");
    assert_eq!(config.channel_capacity, 8);
}

#[test]
fn garbage_values_fall_back() {
    let config = SyncConfig::from_lookup(lookup_from(&[
        ("SCENESYNC_THROTTLE_MS", "fast"),
        ("SCENESYNC_HISTORY_CAPACITY", "-3"),
        ("SCENESYNC_DEFAULT_SIZE", "-10"),
        ("SCENESYNC_DEFAULT_FILL", "   "),
    ]));
    assert_eq!(config.throttle_interval, Duration::from_millis(16));
    assert_eq!(config.history_capacity, 50);
    assert_eq!(config.default_size, 100.0);
    assert_eq!(config.default_fill, "#3B82F6");
}

#[test]
fn zero_capacity_is_clamped() {
    let config = SyncConfig::from_lookup(lookup_from(&[("SCENESYNC_HISTORY_CAPACITY", "0")]));
    assert_eq!(config.history_capacity, 1);
}
