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

//! Port status classification.
//!
//! The thresholds below are the operational rules the patrol team works by,
//! boundary values included.

use crate::model::ClassifiedPort;

/// Name fragment marking an abandoned unit found outside its port.
pub const ABANDONED_MARKER: &str = "ポート外";

const URGENT_WEIGHT: f64 = 10.0;
const YELLOW_COUNT: f64 = 3.0;
const WATCH_COUNT: f64 = 2.0;
const YELLOW_WEIGHT_MIN: f64 = 5.0;
const YELLOW_WEIGHT_MAX: f64 = 9.0;

const MIN_RADIUS: f32 = 6.0;
const MAX_RADIUS: f32 = 22.0;
const RADIUS_PER_UNIT: f32 = 2.0;

/// Status tag for a port that needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortStatus {
    /// Must be swapped today.
    Urgent,
    /// Worth swapping when passing by.
    WatchYellow,
    /// Keep an eye on it; no patrol needed.
    WatchGreen,
}

impl PortStatus {
    /// Machine tag, as used in the legend and popups.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::WatchYellow => "watch-yellow",
            Self::WatchGreen => "watch-green",
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Urgent => "Swap required",
            Self::WatchYellow => "Swappable",
            Self::WatchGreen => "Monitoring",
        }
    }

    /// Marker fill color as RGB.
    #[must_use]
    pub const fn color(self) -> (u8, u8, u8) {
        match self {
            Self::Urgent => (0xe6, 0x00, 0x26),
            Self::WatchYellow => (0xff, 0x8c, 0x00),
            Self::WatchGreen => (0x6f, 0xa8, 0x6f),
        }
    }
}

/// Whether a port name carries the abandoned-unit marker.
#[must_use]
pub fn is_abandoned(name: &str) -> bool {
    name.contains(ABANDONED_MARKER)
}

/// Classify a port from its raw metrics. First matching rule wins.
///
/// NaN inputs are treated as 0.
#[must_use]
pub fn classify(weight: f64, count: f64, name: &str) -> Option<PortStatus> {
    let w = if weight.is_nan() { 0.0 } else { weight };
    let c = if count.is_nan() { 0.0 } else { count };

    // "count >= 3 and weight >= 10" is covered by the weight rule alone.
    if w >= URGENT_WEIGHT || is_abandoned(name) {
        return Some(PortStatus::Urgent);
    }
    if c >= YELLOW_COUNT || (c >= WATCH_COUNT && (YELLOW_WEIGHT_MIN..=YELLOW_WEIGHT_MAX).contains(&w)) {
        return Some(PortStatus::WatchYellow);
    }
    if c >= WATCH_COUNT {
        return Some(PortStatus::WatchGreen);
    }
    None
}

/// Marker radius in pixels for a unit count.
#[must_use]
#[allow(clippy::cast_possible_truncation, reason = "counts are small integers")]
pub fn radius_for_count(count: f64) -> f32 {
    let c = if count.is_finite() { count as f32 } else { 0.0 };
    (MIN_RADIUS + RADIUS_PER_UNIT * c).clamp(MIN_RADIUS, MAX_RADIUS)
}

/// Per-bucket totals for one classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub urgent: usize,
    pub yellow: usize,
    pub green: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Option<PortStatus>) {
        match status {
            Some(PortStatus::Urgent) => self.urgent += 1,
            Some(PortStatus::WatchYellow) => self.yellow += 1,
            Some(PortStatus::WatchGreen) => self.green += 1,
            None => {}
        }
    }

    #[must_use]
    pub fn tally(ports: &[ClassifiedPort]) -> Self {
        let mut counts = Self::default();
        for port in ports {
            counts.record(port.status);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortRecord;

    #[test]
    fn test_heavy_weight_is_always_urgent() {
        for weight in [10.0, 10.5, 15.0, 250.0] {
            for count in [0.0, 1.0, 2.0, 3.0, 9.0] {
                for name in ["x", "", "Karasuma"] {
                    assert_eq!(classify(weight, count, name), Some(PortStatus::Urgent));
                }
            }
        }
    }

    #[test]
    fn test_abandoned_marker_is_always_urgent() {
        for weight in [0.0, 5.0, 9.0] {
            for count in [0.0, 1.0, 2.0, 5.0] {
                assert_eq!(
                    classify(weight, count, "四条烏丸(ポート外)"),
                    Some(PortStatus::Urgent)
                );
            }
        }
    }

    #[test]
    fn test_reference_cases() {
        assert_eq!(classify(7.0, 2.0, "x"), Some(PortStatus::WatchYellow));
        assert_eq!(classify(7.0, 1.0, "x"), None);
        assert_eq!(classify(0.0, 2.0, "x"), Some(PortStatus::WatchGreen));
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(classify(9.0, 2.0, "x"), Some(PortStatus::WatchYellow));
        assert_eq!(classify(5.0, 2.0, "x"), Some(PortStatus::WatchYellow));
        assert_eq!(classify(4.0, 2.0, "x"), Some(PortStatus::WatchGreen));
        assert_eq!(classify(9.5, 2.0, "x"), Some(PortStatus::WatchGreen));
        assert_eq!(classify(0.0, 3.0, "x"), Some(PortStatus::WatchYellow));
        assert_eq!(classify(9.0, 0.0, "x"), None);
    }

    #[test]
    fn test_nan_treated_as_zero() {
        assert_eq!(classify(f64::NAN, 2.0, "x"), Some(PortStatus::WatchGreen));
        assert_eq!(classify(f64::NAN, f64::NAN, "x"), None);
    }

    #[test]
    fn test_radius_clamped() {
        assert!((radius_for_count(0.0) - 6.0).abs() < f32::EPSILON);
        assert!((radius_for_count(3.0) - 12.0).abs() < f32::EPSILON);
        assert!((radius_for_count(8.0) - 22.0).abs() < f32::EPSILON);
        assert!((radius_for_count(40.0) - 22.0).abs() < f32::EPSILON);
        assert!((radius_for_count(-4.0) - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_counts() {
        let ports: Vec<_> = [(12.0, 0.0), (0.0, 3.0), (0.0, 2.0), (0.0, 2.0), (0.0, 0.0)]
            .into_iter()
            .map(|(w, c)| ClassifiedPort::new(PortRecord::new("p", 35.0, 135.7, w, c)))
            .collect();

        assert_eq!(
            StatusCounts::tally(&ports),
            StatusCounts { urgent: 1, yellow: 1, green: 2 }
        );
    }
}
