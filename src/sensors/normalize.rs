//! Tolerant telemetry normalisation.
//!
//! The platform answers a latest-values query with one series per key:
//!
//! ```json
//! {"temperature": [{"ts": 1712, "value": "23.5"}], "humidity": [], ...}
//! ```
//!
//! Keys may be missing, series may be empty, and values may arrive as JSON
//! numbers, numeric strings, booleans or boolean strings depending on how
//! the device published them.  [`normalize`] turns any of that into a fully
//! typed [`SensorSnapshot`] and never fails; every reading that could not be
//! used falls back to its default and is named in [`Normalized::defaulted`].
//!
//! | Key               | Accepted                          | Default |
//! |-------------------|-----------------------------------|---------|
//! | `temperature`     | finite number, numeric string     | `0.0`   |
//! | `humidity`        | finite number, numeric string     | `0.0`   |
//! | `fabric_detected` | bool, `"true"`/`"false"` (any case) | `false` |

use heapless::Vec;
use serde_json::Value;

use crate::fsm::context::SensorSnapshot;

pub const KEY_TEMPERATURE: &str = "temperature";
pub const KEY_HUMIDITY: &str = "humidity";
pub const KEY_FABRIC: &str = "fabric_detected";

/// Keys requested from the platform, in query order.
pub const TELEMETRY_KEYS: [&str; 3] = [KEY_TEMPERATURE, KEY_HUMIDITY, KEY_FABRIC];

/// A snapshot plus the keys that fell back to their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub snapshot: SensorSnapshot,
    pub defaulted: Vec<&'static str, 3>,
}

impl Normalized {
    /// Every reading defaulted (used when there is no body to parse).
    pub fn all_defaults() -> Self {
        Self {
            snapshot: SensorSnapshot::default(),
            defaulted: Vec::from_slice(&TELEMETRY_KEYS).unwrap_or_default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Normalise a latest-values body.  `invert_fabric` flips a fabric reading
/// that was actually present; a defaulted one stays `false`.
pub fn normalize(body: &str, invert_fabric: bool) -> Normalized {
    let Ok(Value::Object(root)) = serde_json::from_str::<Value>(body) else {
        return Normalized::all_defaults();
    };
    let first = |key: &str| {
        root.get(key)
            .and_then(Value::as_array)
            .and_then(|series| series.first())
            .and_then(|point| point.get("value"))
    };

    let mut defaulted = Vec::new();
    let mut note = |key: &'static str| {
        // Capacity equals the key count.
        let _ = defaulted.push(key);
    };

    let temperature = first(KEY_TEMPERATURE).and_then(as_number).unwrap_or_else(|| {
        note(KEY_TEMPERATURE);
        0.0
    });
    let humidity = first(KEY_HUMIDITY).and_then(as_number).unwrap_or_else(|| {
        note(KEY_HUMIDITY);
        0.0
    });
    let fabric_present = match first(KEY_FABRIC).and_then(as_flag) {
        Some(v) => v != invert_fabric,
        None => {
            note(KEY_FABRIC);
            false
        }
    };

    Normalized {
        snapshot: SensorSnapshot::new(temperature, humidity, fabric_present),
        defaulted,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}
