//! Zone records produced by the zone-detection service

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Base pattern of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pattern {
    /// Rally-base-rally
    Rbr,
    /// Drop-base-rally
    Dbr,
    Other(String),
}

impl Pattern {
    pub fn label(&self) -> &str {
        match self {
            Pattern::Rbr => "RBR",
            Pattern::Dbr => "DBR",
            Pattern::Other(label) if label.is_empty() => "Zone",
            Pattern::Other(label) => label,
        }
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::Other(String::new())
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        match value.trim().to_uppercase().as_str() {
            "RBR" => Pattern::Rbr,
            "DBR" => Pattern::Dbr,
            _ => Pattern::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::from(value.to_string())
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Retest classification assigned upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    /// 0: price has traded through the zone
    Breached,
    /// 1.5: price has come back to the zone once
    Tested,
    /// 3: untouched since formation
    Fresh,
}

impl Freshness {
    pub fn from_score(score: f64) -> Option<Self> {
        if score == 0.0 {
            Some(Freshness::Breached)
        } else if score == 1.5 {
            Some(Freshness::Tested)
        } else if score == 3.0 {
            Some(Freshness::Fresh)
        } else {
            None
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Freshness::Breached => 0.0,
            Freshness::Tested => 1.5,
            Freshness::Fresh => 3.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Breached => "breached",
            Freshness::Tested => "tested",
            Freshness::Fresh => "fresh",
        }
    }
}

/// A demand/supply price band.
///
/// Zones are read-only input and every field decodes leniently: prices and
/// scores that are missing or not numeric become NaN, odd-typed text fields
/// fall back to their defaults and nested zones that cannot be read are
/// dropped. One bad entry never fails the whole list; the annotator skips
/// zones without usable lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, deserialize_with = "lenient_id")]
    pub zone_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub ticker: Option<String>,
    #[serde(default = "missing_price", deserialize_with = "lenient_price")]
    pub proximal_line: f64,
    #[serde(default = "missing_price", deserialize_with = "lenient_price")]
    pub distal_line: f64,
    #[serde(default, deserialize_with = "lenient_pattern")]
    pub pattern: Pattern,
    #[serde(default, deserialize_with = "lenient_price")]
    pub trade_score: f64,
    #[serde(default, deserialize_with = "lenient_price")]
    pub freshness: f64,
    #[serde(default, alias = "start_timestamp", deserialize_with = "lenient_text")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "end_timestamp", deserialize_with = "lenient_text")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_zones")]
    pub coinciding_lower_zones: Vec<Zone>,
}

impl Zone {
    pub fn new(
        zone_id: impl Into<String>,
        proximal_line: f64,
        distal_line: f64,
        pattern: Pattern,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            ticker: None,
            proximal_line,
            distal_line,
            pattern,
            trade_score: 0.0,
            freshness: Freshness::Fresh.score(),
            start_time: None,
            timestamp: None,
            end_time: None,
            coinciding_lower_zones: Vec::new(),
        }
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness.score();
        self
    }

    pub fn with_lower_zones(mut self, lower: Vec<Zone>) -> Self {
        self.coinciding_lower_zones = lower;
        self
    }

    /// Formation time; older payloads only carry `timestamp`.
    pub fn start(&self) -> Option<&str> {
        self.start_time.as_deref().or(self.timestamp.as_deref())
    }

    pub fn freshness_class(&self) -> Option<Freshness> {
        Freshness::from_score(self.freshness)
    }

    pub fn has_valid_lines(&self) -> bool {
        self.proximal_line.is_finite() && self.distal_line.is_finite()
    }
}

fn missing_price() -> f64 {
    f64::NAN
}

fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let price = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(price.unwrap_or(f64::NAN))
}

fn lenient_pattern<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pattern, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Pattern::from(s),
        _ => Pattern::default(),
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_zones<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Zone>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => zones_from_values(values).0,
        _ => Vec::new(),
    })
}

/// Decode each entry on its own; returns the zones read and how many were skipped.
pub fn zones_from_values(values: Vec<Value>) -> (Vec<Zone>, usize) {
    let mut skipped = 0;
    let zones = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Zone>(value) {
            Ok(zone) => Some(zone),
            Err(e) => {
                warn!("Skipping unreadable zone: {}", e);
                skipped += 1;
                None
            }
        })
        .collect();
    (zones, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_backend_zone() {
        let zone: Zone = serde_json::from_value(json!({
            "zone_id": "ABB-1d-2025-01-10",
            "ticker": "ABB",
            "proximal_line": 100.5,
            "distal_line": "95.0",
            "trade_score": 7.5,
            "pattern": "rbr",
            "timestamp": "2025-01-10T00:00:00",
            "end_timestamp": "2025-01-14T00:00:00",
            "freshness": 1.5,
            "coinciding_lower_zones": [{
                "zone_id": "ABB-1h-1",
                "proximal_line": 98.0,
                "distal_line": 96.5,
                "pattern": "DBR",
                "start_timestamp": "2025-01-11T09:15:00",
                "timestamp": "2025-01-11T09:15:00"
            }]
        }))
        .unwrap();

        assert_eq!(zone.pattern, Pattern::Rbr);
        assert_eq!(zone.distal_line, 95.0);
        assert_eq!(zone.freshness_class(), Some(Freshness::Tested));
        assert_eq!(zone.start(), Some("2025-01-10T00:00:00"));
        assert_eq!(zone.end_time.as_deref(), Some("2025-01-14T00:00:00"));
        assert_eq!(zone.coinciding_lower_zones.len(), 1);
        assert_eq!(zone.coinciding_lower_zones[0].pattern, Pattern::Dbr);
    }

    #[test]
    fn test_non_numeric_lines_become_nan() {
        let zone: Zone = serde_json::from_value(json!({
            "zone_id": "bad",
            "proximal_line": "n/a",
            "pattern": "RBR"
        }))
        .unwrap();

        assert!(zone.proximal_line.is_nan());
        assert!(zone.distal_line.is_nan());
        assert!(!zone.has_valid_lines());
    }

    #[test]
    fn test_odd_field_types_do_not_fail_the_zone() {
        let zone: Zone = serde_json::from_value(json!({
            "zone_id": 42,
            "ticker": null,
            "proximal_line": 100.5,
            "distal_line": 95.0,
            "pattern": null,
            "trade_score": "n/a",
            "freshness": "3",
            "timestamp": 1736467200,
            "coinciding_lower_zones": [
                "not a zone",
                {"zone_id": "ok", "proximal_line": 98.0, "distal_line": 96.5, "pattern": "RBR"}
            ]
        }))
        .unwrap();

        assert_eq!(zone.zone_id, "42");
        assert_eq!(zone.pattern, Pattern::default());
        assert!(zone.trade_score.is_nan());
        assert_eq!(zone.freshness_class(), Some(Freshness::Fresh));
        assert_eq!(zone.start(), None);
        assert_eq!(zone.coinciding_lower_zones.len(), 1);
        assert!(zone.has_valid_lines());
    }

    #[test]
    fn test_zones_from_values_skips_unreadable_entries() {
        let (zones, skipped) = zones_from_values(vec![
            json!({"zone_id": "a", "proximal_line": 10.0, "distal_line": 9.0, "pattern": "DBR"}),
            json!("garbage"),
            json!(null),
        ]);

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].pattern, Pattern::Dbr);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_pattern_labels() {
        assert_eq!(Pattern::from("DBR").label(), "DBR");
        assert_eq!(Pattern::from("ascending base").label(), "ascending base");
        assert_eq!(Pattern::default().label(), "Zone");
        assert_eq!(serde_json::to_string(&Pattern::Rbr).unwrap(), "\"RBR\"");
    }
}
