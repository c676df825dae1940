//! Attribute merge for incoming payloads

use serde_json::{Map, Value};

/// Keys owned by the typed log fields; never stored as attributes.
pub const RESERVED_KEYS: [&str; 5] = ["service", "level", "message", "log_timestamp", "attributes"];

/// Two stage merge: open fields first, explicit attributes on top, then the
/// reserved keys are dropped from the result.
pub fn merge_attributes(extra: &Map<String, Value>, explicit: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = extra.clone();
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    strip_reserved(&mut merged);
    merged
}

pub fn strip_reserved(attributes: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        attributes.remove(key);
    }
}

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
