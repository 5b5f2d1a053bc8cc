use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::models::Event;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses timestamps from the variety of formats found in event exports.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Attempt to parse a [`serde_json::Value`] into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * `null`       → `None`
    /// * JSON string  → RFC 3339 (including `Z`-suffix) or common naive
    ///   date-time patterns, interpreted as UTC.
    /// * JSON number  → Unix timestamp (integer or float seconds).
    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::parse_str(s.as_str()),
            Value::Number(n) => {
                if let Some(secs) = n.as_i64() {
                    DateTime::from_timestamp(secs, 0)
                } else if let Some(f) = n.as_f64() {
                    let floor = f.floor();
                    let nanos = ((f - floor) * 1_000_000_000.0).round() as u32;
                    // Rounding up to a full second carries into `secs`.
                    let (secs, nanos) = if nanos >= 1_000_000_000 {
                        (floor as i64 + 1, 0)
                    } else {
                        (floor as i64, nanos)
                    };
                    DateTime::from_timestamp(secs, nanos)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Parse a timestamp string. Naive values are taken as UTC.
    pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        const DATETIME_FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];

        for fmt in DATETIME_FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }

        warn!("could not parse timestamp string \"{}\"", s);
        None
    }
}

// ── PriceExtractor ────────────────────────────────────────────────────────────

/// Reads an optional price from a raw JSON value.
pub struct PriceExtractor;

impl PriceExtractor {
    /// Numbers and numeric strings become prices; `null`, `NaN`, empty or
    /// non-numeric values are treated as a missing price.
    pub fn extract(value: Option<&Value>) -> Option<f64> {
        let price = match value? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        price.is_finite().then_some(price)
    }
}

// ── EventConverter ────────────────────────────────────────────────────────────

/// Maps raw JSON event records onto [`Event`].
pub struct EventConverter;

impl EventConverter {
    /// Convert one raw record. Requires a non-empty `user_id`, an action under
    /// `event` or `action`, and a parseable `timestamp`; other attributes
    /// default to empty.
    pub fn from_value(data: &Value) -> Option<Event> {
        let user_id = Self::string_field(data, "user_id")?;
        let action = Self::string_field(data, "event").or_else(|| Self::string_field(data, "action"))?;
        let timestamp = TimestampProcessor::parse(data.get("timestamp")?)?;

        Some(Event {
            user_id,
            action,
            timestamp,
            price: PriceExtractor::extract(data.get("price")),
            category: Self::string_field(data, "category").unwrap_or_default(),
            sku_id: Self::string_field(data, "sku_id").unwrap_or_default(),
            brand: Self::string_field(data, "brand").unwrap_or_default(),
        })
    }

    /// Read `key` as a non-empty string; numbers are stringified.
    fn string_field(data: &Value, key: &str) -> Option<String> {
        let s = match data.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
