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

//! Map widget: slippy tiles, status markers, popups and the location dot.
//!
//! [`MapState`] holds everything the controller can ask of a map and is
//! independent of egui. [`MapPanel`] adds tiles and input handling on top.

use egui::{Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Vec2};
use patrol_core::map::{MapSettings, Marker, MarkerKey, Viewport};
use patrol_core::{LatLng, LocationFix, MapView};

use crate::tiles::{TileManager, WebMercator, TILE_SIZE};

/// Web Mercator ground resolution at the equator, zoom 0, in m/px.
const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;

/// Scroll distance for one zoom level.
const SCROLL_PER_ZOOM_LEVEL: f32 = 200.0;

const BACKGROUND: Color32 = Color32::from_rgb(232, 236, 240);
const LOCATION_BLUE: Color32 = Color32::from_rgb(0x1e, 0x88, 0xe5);

/// Converts between coordinates and screen positions for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    center_x: f64,
    center_y: f64,
    zoom: f64,
    origin: Pos2,
}

impl Projection {
    #[must_use]
    pub fn new(viewport: Viewport, origin: Pos2) -> Self {
        Self {
            center_x: WebMercator::lon_to_x(viewport.center.lng, viewport.zoom),
            center_y: WebMercator::lat_to_y(viewport.center.lat, viewport.zoom),
            zoom: viewport.zoom,
            origin,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "screen coordinates fit in f32")]
    pub fn to_screen(&self, point: LatLng) -> Pos2 {
        let x = (WebMercator::lon_to_x(point.lng, self.zoom) - self.center_x) * f64::from(TILE_SIZE);
        let y = (WebMercator::lat_to_y(point.lat, self.zoom) - self.center_y) * f64::from(TILE_SIZE);
        Pos2::new(self.origin.x + x as f32, self.origin.y + y as f32)
    }

    /// Coordinate of the map center after dragging the map by `delta` pixels.
    #[must_use]
    pub fn center_after_drag(&self, delta: Vec2) -> LatLng {
        let x = self.center_x - f64::from(delta.x) / f64::from(TILE_SIZE);
        let y = self.center_y - f64::from(delta.y) / f64::from(TILE_SIZE);
        LatLng::new(WebMercator::y_to_lat(y, self.zoom), WebMercator::x_to_lon(x, self.zoom))
    }
}

/// Ground meters covered by one screen pixel.
#[must_use]
pub fn meters_per_pixel(lat: f64, zoom: f64) -> f64 {
    EQUATOR_METERS_PER_PIXEL * lat.to_radians().cos() / zoom.exp2()
}

/// Map contents as the controller sees them.
#[derive(Debug, Clone)]
pub struct MapState {
    settings: MapSettings,
    viewport: Viewport,
    markers: Vec<Marker>,
    open_popup: Option<MarkerKey>,
    location: Option<LocationFix>,
}

impl MapState {
    #[must_use]
    pub fn new(settings: MapSettings) -> Self {
        Self {
            viewport: settings.initial_viewport(),
            settings,
            markers: Vec::new(),
            open_popup: None,
            location: None,
        }
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn popup_marker(&self) -> Option<&Marker> {
        let key = self.open_popup.as_ref()?;
        self.markers.iter().find(|m| &m.key == key)
    }

    pub fn close_popup(&mut self) {
        self.open_popup = None;
    }

    /// Topmost marker under `pointer`; later markers draw on top.
    #[must_use]
    pub fn hit_test(&self, projection: &Projection, pointer: Pos2) -> Option<&Marker> {
        self.markers
            .iter()
            .rev()
            .find(|m| projection.to_screen(m.position).distance(pointer) <= m.radius)
    }

    /// Apply a user zoom step, keeping inside the configured limits.
    pub fn zoom_by(&mut self, levels: f64) {
        self.set_viewport(Viewport {
            zoom: self.viewport.zoom + levels,
            ..self.viewport
        });
    }
}

impl MapView for MapState {
    fn draw_markers(&mut self, markers: Vec<Marker>) {
        self.markers = markers;
        self.open_popup = None;
    }

    fn pan_to(&mut self, position: LatLng) {
        self.set_viewport(Viewport {
            center: position,
            ..self.viewport
        });
    }

    fn open_popup(&mut self, key: &MarkerKey) -> bool {
        if self.markers.iter().any(|m| &m.key == key) {
            self.open_popup = Some(key.clone());
            true
        } else {
            false
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = self.settings.constrain(viewport);
    }

    fn show_location(&mut self, fix: &LocationFix) {
        self.location = Some(*fix);
    }
}

/// What the user did with the map this frame.
#[derive(Debug, Default)]
pub struct MapResponse {
    /// The user dragged or zoomed.
    pub user_moved: bool,
    /// Directions link clicked in a popup.
    pub open_url: Option<String>,
}

#[derive(Debug)]
pub struct MapPanel {
    state: MapState,
    tiles: TileManager,
}

impl MapPanel {
    #[must_use]
    pub fn new(settings: MapSettings, tiles: TileManager) -> Self {
        Self {
            state: MapState::new(settings),
            tiles,
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> MapResponse {
        let mut out = MapResponse::default();
        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        let rect = response.rect;
        painter.rect_filled(rect, 0.0, BACKGROUND);

        if response.hovered() {
            let (pinch, scroll) = ui.input(|i| (i.zoom_delta(), i.smooth_scroll_delta.y));
            let levels = f64::from(pinch.log2() + scroll / SCROLL_PER_ZOOM_LEVEL);
            if levels.abs() > 1e-3 {
                self.state.zoom_by(levels);
                out.user_moved = true;
            }
        }

        if response.dragged() {
            let delta = response.drag_delta();
            if delta != Vec2::ZERO {
                let projection = Projection::new(self.state.viewport(), rect.center());
                self.state.pan_to(projection.center_after_drag(delta));
                out.user_moved = true;
            }
        }

        let projection = Projection::new(self.state.viewport(), rect.center());
        self.paint_tiles(ui.ctx(), &painter, rect);
        self.paint_location(&painter, &projection);
        self.paint_markers(&painter, &projection);

        if response.clicked() {
            let hit = response
                .interact_pointer_pos()
                .and_then(|pos| self.state.hit_test(&projection, pos))
                .map(|m| m.key.clone());
            match hit {
                Some(key) => {
                    self.state.open_popup(&key);
                }
                None => self.state.close_popup(),
            }
        }

        self.show_popup(ui.ctx(), &projection, &mut out);
        self.paint_attribution(&painter, rect);
        out
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "zoom is clamped to a small positive range")]
    fn paint_tiles(&self, ctx: &egui::Context, painter: &egui::Painter, rect: Rect) {
        let viewport = self.state.viewport();
        let tile_zoom = viewport.zoom.round().clamp(0.0, f64::from(self.tiles.max_zoom())) as u8;
        let scale = (viewport.zoom - f64::from(tile_zoom)).exp2() as f32;
        let center = rect.center();

        let visible = TileManager::get_visible_tiles(
            viewport.center.lat,
            viewport.center.lng,
            tile_zoom,
            rect.width() / scale,
            rect.height() / scale,
        );
        for (coord, offset_x, offset_y) in visible {
            if let Some(texture) = self.tiles.get_tile(coord, ctx) {
                let tile_rect = Rect::from_min_size(
                    Pos2::new(center.x + offset_x * scale, center.y + offset_y * scale),
                    Vec2::splat(TILE_SIZE * scale),
                );
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
        }

        let failed = self.tiles.get_error_count();
        let message = if failed > 0 {
            Some(format!("Failed to load {failed} tiles"))
        } else if self.tiles.has_loading_tiles() {
            Some("Loading map tiles...".to_string())
        } else {
            None
        };
        if let Some(message) = message {
            painter.text(
                rect.left_bottom() + Vec2::new(8.0, -8.0),
                Align2::LEFT_BOTTOM,
                message,
                FontId::proportional(11.0),
                Color32::from_gray(90),
            );
        }
    }

    fn paint_markers(&self, painter: &egui::Painter, projection: &Projection) {
        for marker in self.state.markers() {
            let (r, g, b) = marker.color;
            let pos = projection.to_screen(marker.position);
            painter.circle_filled(pos, marker.radius, Color32::from_rgba_unmultiplied(r, g, b, 217));
            painter.circle_stroke(pos, marker.radius, Stroke::new(1.5, Color32::WHITE));
        }
    }

    #[allow(clippy::cast_possible_truncation, reason = "pixel radius")]
    fn paint_location(&self, painter: &egui::Painter, projection: &Projection) {
        let Some(fix) = self.state.location else {
            return;
        };
        let pos = projection.to_screen(fix.position);
        let accuracy_px = (fix.accuracy_m / meters_per_pixel(fix.position.lat, self.state.viewport().zoom)) as f32;
        painter.circle_filled(pos, accuracy_px, LOCATION_BLUE.gamma_multiply(0.15));
        painter.circle_stroke(pos, accuracy_px, Stroke::new(1.0, LOCATION_BLUE.gamma_multiply(0.5)));
        painter.circle_filled(pos, 7.0, Color32::WHITE);
        painter.circle_filled(pos, 5.0, LOCATION_BLUE);
    }

    fn show_popup(&mut self, ctx: &egui::Context, projection: &Projection, out: &mut MapResponse) {
        let Some(marker) = self.state.popup_marker() else {
            return;
        };
        let anchor = projection.to_screen(marker.position) - Vec2::new(0.0, marker.radius + 4.0);
        let popup = marker.popup.clone();
        let mut close = false;

        egui::Area::new(egui::Id::new("marker_popup"))
            .fixed_pos(anchor)
            .pivot(Align2::CENTER_BOTTOM)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(&popup.name).strong());
                        if ui.small_button("✕").clicked() {
                            close = true;
                        }
                    });
                    let (r, g, b) = popup.status.color();
                    ui.label(egui::RichText::new(format!("● {}", popup.status.label())).color(Color32::from_rgb(r, g, b)));
                    if ui.link("Directions").on_hover_text(&popup.directions_url).clicked() {
                        out.open_url = Some(popup.directions_url.clone());
                    }
                });
            });

        if close {
            self.state.close_popup();
        }
    }

    fn paint_attribution(&self, painter: &egui::Painter, rect: Rect) {
        painter.text(
            rect.right_bottom() + Vec2::new(-6.0, -4.0),
            Align2::RIGHT_BOTTOM,
            self.tiles.attribution().text,
            FontId::proportional(10.0),
            Color32::from_gray(80),
        );
    }
}

impl MapView for MapPanel {
    fn draw_markers(&mut self, markers: Vec<Marker>) {
        self.state.draw_markers(markers);
    }

    fn pan_to(&mut self, position: LatLng) {
        self.state.pan_to(position);
    }

    fn open_popup(&mut self, key: &MarkerKey) -> bool {
        self.state.open_popup(key)
    }

    fn viewport(&self) -> Viewport {
        self.state.viewport()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.set_viewport(viewport);
    }

    fn show_location(&mut self, fix: &LocationFix) {
        self.state.show_location(fix);
    }
}

#[cfg(test)]
mod tests {
    use patrol_core::map::build_markers;
    use patrol_core::model::{classify_all, PortRecord};
    use patrol_core::ViewFilter;

    use super::*;

    fn state_with_markers() -> MapState {
        let ports = classify_all(&[
            PortRecord::new("Shijo", 35.0035, 135.7681, 12.0, 1.0),
            PortRecord::new("Gion", 35.0037, 135.7750, 0.0, 3.0),
        ]);
        let mut state = MapState::new(MapSettings::default());
        state.draw_markers(build_markers(&ports, ViewFilter::default()));
        state
    }

    #[test]
    fn test_projection_center_maps_to_origin() {
        let viewport = MapSettings::default().initial_viewport();
        let origin = Pos2::new(400.0, 300.0);
        let projection = Projection::new(viewport, origin);
        assert!(projection.to_screen(viewport.center).distance(origin) < 1e-3);
    }

    #[test]
    fn test_drag_moves_center_opposite() {
        let viewport = MapSettings::default().initial_viewport();
        let projection = Projection::new(viewport, Pos2::ZERO);
        let moved = projection.center_after_drag(Vec2::new(100.0, 0.0));
        assert!(moved.lng < viewport.center.lng);
        assert!((moved.lat - viewport.center.lat).abs() < 1e-9);
    }

    #[test]
    fn test_hit_test_picks_marker_under_pointer() {
        let mut state = state_with_markers();
        state.set_viewport(Viewport {
            center: LatLng::new(35.0035, 135.7681),
            zoom: 16.0,
        });
        let projection = Projection::new(state.viewport(), Pos2::new(500.0, 500.0));

        let hit = state.hit_test(&projection, Pos2::new(502.0, 501.0));
        assert_eq!(hit.map(|m| m.popup.name.as_str()), Some("Shijo"));
        assert!(state.hit_test(&projection, Pos2::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn test_redraw_closes_popup() {
        let mut state = state_with_markers();
        assert!(state.open_popup(&MarkerKey::new(35.0037, 135.7750, "Gion")));
        assert!(state.popup_marker().is_some());

        state.draw_markers(Vec::new());
        assert!(state.popup_marker().is_none());
        assert!(!state.open_popup(&MarkerKey::new(35.0037, 135.7750, "Gion")));
    }

    #[test]
    fn test_viewport_stays_in_region() {
        let mut state = MapState::new(MapSettings::default());
        state.pan_to(LatLng::new(40.0, 140.0));
        assert_eq!(state.viewport().center, LatLng::new(35.15, 135.90));
        state.zoom_by(20.0);
        assert!((state.viewport().zoom - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_viewport_in_range_is_exact() {
        let mut state = MapState::new(MapSettings::default());
        let viewport = Viewport {
            center: LatLng::new(35.012_345_678_9, 135.765_432_1),
            zoom: 14.372_1,
        };
        state.set_viewport(viewport);
        assert_eq!(state.viewport(), viewport);
    }

    #[test]
    fn test_meters_per_pixel_halves_per_zoom() {
        let a = meters_per_pixel(35.0, 13.0);
        let b = meters_per_pixel(35.0, 14.0);
        assert!((a / b - 2.0).abs() < 1e-9);
    }
}
