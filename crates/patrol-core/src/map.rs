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

//! Map-side model: viewport, region bounds and status markers.
//!
//! The actual map widget lives behind the [`MapView`] trait. This module
//! decides *what* gets drawn; the widget decides how.

use serde::{Deserialize, Serialize};

use crate::filter::ViewFilter;
use crate::geolocation::LocationFix;
use crate::model::ClassifiedPort;
use crate::status::{radius_for_count, PortStatus};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Rectangular region the map may not leave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl GeoBounds {
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }

    /// Nearest point inside the bounds.
    #[must_use]
    pub fn clamp(&self, point: LatLng) -> LatLng {
        LatLng {
            lat: clamp_between(point.lat, self.south_west.lat, self.north_east.lat),
            lng: clamp_between(point.lng, self.south_west.lng, self.north_east.lng),
        }
    }
}

/// Like `f64::clamp`, but the limits may come in either order.
fn clamp_between(value: f64, a: f64, b: f64) -> f64 {
    value.max(a.min(b)).min(a.max(b))
}

/// Current map center and zoom.
///
/// Compared exactly; a refresh must hand back the very same values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
}

/// Fixed geography of the map widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapSettings {
    pub bounds: GeoBounds,
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for MapSettings {
    /// Central Kyoto.
    fn default() -> Self {
        Self {
            bounds: GeoBounds {
                south_west: LatLng::new(34.85, 135.60),
                north_east: LatLng::new(35.15, 135.90),
            },
            center: LatLng::new(35.0116, 135.7681),
            zoom: 13.0,
            min_zoom: 11.0,
            max_zoom: 18.0,
        }
    }
}

impl MapSettings {
    #[must_use]
    pub fn initial_viewport(&self) -> Viewport {
        Viewport {
            center: self.center,
            zoom: self.zoom,
        }
    }

    /// Keep a viewport inside the configured region and zoom range.
    #[must_use]
    pub fn constrain(&self, viewport: Viewport) -> Viewport {
        Viewport {
            center: self.bounds.clamp(viewport.center),
            zoom: clamp_between(viewport.zoom, self.min_zoom, self.max_zoom),
        }
    }
}

/// Identity of a marker: coordinate plus name.
///
/// Floats are keyed by bit pattern so lookups match exactly what was drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    lat_bits: u64,
    lng_bits: u64,
    name: String,
}

impl MarkerKey {
    #[must_use]
    pub fn new(lat: f64, lng: f64, name: &str) -> Self {
        Self {
            lat_bits: lat.to_bits(),
            lng_bits: lng.to_bits(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Popup content for a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub name: String,
    pub status: PortStatus,
    pub directions_url: String,
}

/// A status marker ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: MarkerKey,
    pub position: LatLng,
    pub status: PortStatus,
    pub radius: f32,
    pub color: (u8, u8, u8),
    pub popup: Popup,
}

/// Driving directions to a coordinate.
#[must_use]
pub fn directions_url(lat: f64, lng: f64) -> String {
    format!("https://www.google.com/maps/dir/?api=1&destination={lat},{lng}&travelmode=driving")
}

/// Markers for every port that has a status and passes the filter.
#[must_use]
pub fn build_markers(ports: &[ClassifiedPort], filter: ViewFilter) -> Vec<Marker> {
    ports
        .iter()
        .filter_map(|item| {
            let status = item.status?;
            if !filter.allows(status) {
                return None;
            }
            let port = &item.port;
            Some(Marker {
                key: MarkerKey::new(port.lat, port.lng, &port.name),
                position: LatLng::new(port.lat, port.lng),
                status,
                radius: radius_for_count(port.count),
                color: status.color(),
                popup: Popup {
                    name: port.name.clone(),
                    status,
                    directions_url: directions_url(port.lat, port.lng),
                },
            })
        })
        .collect()
}

/// Rendering side of the map.
pub trait MapView {
    /// Remove every marker and draw this set instead.
    fn draw_markers(&mut self, markers: Vec<Marker>);

    /// Re-center on a coordinate, keeping the zoom.
    fn pan_to(&mut self, position: LatLng);

    /// Open the popup of a drawn marker. Returns false if there is none.
    fn open_popup(&mut self, key: &MarkerKey) -> bool;

    fn viewport(&self) -> Viewport;

    /// Jump to a viewport without animation.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Show or move the user's location marker.
    fn show_location(&mut self, fix: &LocationFix);
}

/// Re-center on a port and open its popup if it is on the map.
///
/// Ports that are filtered out or have no status still get panned to; the
/// popup is simply skipped. Returns whether a popup was opened.
pub fn pan_to_and_open<M: MapView + ?Sized>(map: &mut M, lat: f64, lng: f64, name: &str) -> bool {
    map.pan_to(LatLng::new(lat, lng));
    map.open_popup(&MarkerKey::new(lat, lng, name))
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingMap;
    use super::*;
    use crate::model::PortRecord;

    fn ports() -> Vec<ClassifiedPort> {
        [
            ("Urgent", 35.0, 135.7, 12.0, 1.0),
            ("Yellow", 35.01, 135.71, 0.0, 3.0),
            ("Green", 35.02, 135.72, 0.0, 2.0),
            ("Quiet", 35.03, 135.73, 0.0, 0.0),
        ]
        .into_iter()
        .map(|(name, lat, lng, w, c)| ClassifiedPort::new(PortRecord::new(name, lat, lng, w, c)))
        .collect()
    }

    fn marker_names(markers: &[Marker]) -> Vec<&str> {
        markers.iter().map(|m| m.popup.name.as_str()).collect()
    }

    #[test]
    fn test_build_markers_respects_filter() {
        let all = ViewFilter {
            show_yellow: true,
            show_green: true,
        };
        assert_eq!(marker_names(&build_markers(&ports(), all)), ["Urgent", "Yellow", "Green"]);

        let none = ViewFilter {
            show_yellow: false,
            show_green: false,
        };
        assert_eq!(marker_names(&build_markers(&ports(), none)), ["Urgent"]);
    }

    #[test]
    fn test_marker_style_and_popup() {
        let markers = build_markers(&ports(), ViewFilter::default());
        let yellow = &markers[1];
        assert_eq!(yellow.color, PortStatus::WatchYellow.color());
        assert!((yellow.radius - 12.0).abs() < f32::EPSILON);
        assert!(yellow
            .popup
            .directions_url
            .starts_with("https://www.google.com/maps/dir/?api=1&destination=35.01,135.71"));
    }

    #[test]
    fn test_pan_to_and_open_finds_marker() {
        let mut map = RecordingMap::new();
        map.draw_markers(build_markers(&ports(), ViewFilter::default()));

        assert!(pan_to_and_open(&mut map, 35.0, 135.7, "Urgent"));
        assert_eq!(map.open_popup, Some(MarkerKey::new(35.0, 135.7, "Urgent")));
    }

    #[test]
    fn test_pan_to_and_open_without_marker_is_harmless() {
        let mut map = RecordingMap::new();
        map.draw_markers(build_markers(&ports(), ViewFilter::default()));

        assert!(!pan_to_and_open(&mut map, 1.0, 2.0, "Nowhere"));
        assert!(!pan_to_and_open(&mut map, 35.0, 135.7, "Wrong name"));
        assert!(map.open_popup.is_none());
    }

    #[test]
    fn test_constrain_viewport() {
        let settings = MapSettings::default();
        let constrained = settings.constrain(Viewport {
            center: LatLng::new(36.0, 135.0),
            zoom: 3.0,
        });
        assert_eq!(constrained.center, LatLng::new(35.15, 135.60));
        assert!((constrained.zoom - 11.0).abs() < f64::EPSILON);
        assert!(settings.bounds.contains(settings.center));
    }

    #[test]
    fn test_constrain_tolerates_swapped_limits() {
        let settings = MapSettings {
            bounds: GeoBounds {
                south_west: LatLng::new(35.15, 135.90),
                north_east: LatLng::new(34.85, 135.60),
            },
            min_zoom: 18.0,
            max_zoom: 11.0,
            ..MapSettings::default()
        };
        let constrained = settings.constrain(Viewport {
            center: LatLng::new(36.0, 135.0),
            zoom: 20.0,
        });
        assert_eq!(constrained.center, LatLng::new(35.15, 135.60));
        assert!((constrained.zoom - 18.0).abs() < f64::EPSILON);

        let inside = Viewport {
            center: LatLng::new(35.0, 135.7),
            zoom: 13.0,
        };
        assert_eq!(settings.constrain(inside), inside);
    }
}
