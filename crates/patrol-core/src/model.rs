// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Snapshot data types.
//!
//! A snapshot is the `data.json` document the dashboard polls: a flat list of
//! port records plus an optional generation timestamp.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::status::{classify, PortStatus};

/// Raw port record as published in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    /// Port display name.
    #[serde(default)]
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Severity score driving urgency.
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: f64,
    /// Units at the port that need a swap.
    #[serde(default, deserialize_with = "lenient_number")]
    pub count: f64,
    /// Last update stamp from the source sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl PortRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, lat: f64, lng: f64, weight: f64, count: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            weight,
            count,
            updated: None,
        }
    }

    #[must_use]
    pub fn with_updated(mut self, updated: impl Into<String>) -> Self {
        self.updated = Some(updated.into());
        self
    }
}

/// A port record paired with its computed status.
///
/// The record is never modified after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPort {
    pub port: PortRecord,
    pub status: Option<PortStatus>,
}

impl ClassifiedPort {
    #[must_use]
    pub fn new(port: PortRecord) -> Self {
        let status = classify(port.weight, port.count, &port.name);
        Self { port, status }
    }
}

/// Classify every record of a snapshot, preserving order.
#[must_use]
pub fn classify_all(items: &[PortRecord]) -> Vec<ClassifiedPort> {
    items.iter().cloned().map(ClassifiedPort::new).collect()
}

/// The `data.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub items: Vec<PortRecord>,
}

/// Format a metric for display, dropping the fraction for whole numbers.
#[must_use]
pub fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Deserialize a number the way the sheet export produces them.
///
/// Numbers pass through, numeric strings are parsed, booleans become 1/0 and
/// anything else (null, empty or garbage strings, arrays) becomes 0.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_strings_and_garbage_coerce() {
        let json = r#"{"items":[
            {"name":"A","lat":35.0,"lng":135.7,"weight":"7","count":" 2 "},
            {"name":"B","lat":35.1,"lng":135.8,"weight":"heavy","count":null},
            {"name":"C","lat":35.2,"lng":135.9}
        ]}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.items[0].weight, 7.0);
        assert_eq!(snapshot.items[0].count, 2.0);
        assert_eq!(snapshot.items[1].weight, 0.0);
        assert_eq!(snapshot.items[1].count, 0.0);
        assert_eq!(snapshot.items[2].weight, 0.0);
        assert!(snapshot.items[2].updated.is_none());
    }

    #[test]
    fn test_classification_keeps_raw_fields() {
        let record = PortRecord::new("Kawaramachi", 35.0, 135.77, 11.0, 4.0).with_updated("2025-05-01");
        let classified = ClassifiedPort::new(record.clone());

        assert_eq!(classified.port, record);
        assert_eq!(classified.status, Some(PortStatus::Urgent));
    }

    #[test]
    fn test_format_metric() {
        assert_eq!(format_metric(7.0), "7");
        assert_eq!(format_metric(2.5), "2.5");
        assert_eq!(format_metric(0.0), "0");
    }
}
