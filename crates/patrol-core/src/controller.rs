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

//! Dashboard controller.
//!
//! The controller owns every piece of mutable dashboard state and is the only
//! thing that talks to the map, the table and the location service. UI code
//! feeds it discrete events (checkbox toggled, header clicked, poll saw a
//! change, ...) and reads [`DashboardState`] back for the chrome around the
//! two views.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::filter::{FilterState, ViewFilter};
use crate::geolocation::{FixOrigin, FollowAction, FollowState, LocationEvent, LocationService};
use crate::loader::{latest_update, parse_snapshot, LoadError, LoadedSnapshot, NO_UPDATE_PLACEHOLDER};
use crate::map::{build_markers, pan_to_and_open, MapView};
use crate::model::{classify_all, ClassifiedPort, Snapshot};
use crate::status::StatusCounts;
use crate::table::{SortKey, SortState, TableModel, TableView};

/// Urgent count at which the watch checkboxes default to off.
pub const DEFAULT_URGENT_THRESHOLD: usize = 40;

/// How long a transient notice stays up.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub urgent_threshold: usize,
    pub notice_ttl: Duration,
    pub initial_filter: ViewFilter,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            urgent_threshold: DEFAULT_URGENT_THRESHOLD,
            notice_ttl: DEFAULT_NOTICE_TTL,
            initial_filter: ViewFilter::default(),
        }
    }
}

/// Short-lived message shown over the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub raised_at: Instant,
}

/// Everything the dashboard chrome needs to draw itself.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub classified: Vec<ClassifiedPort>,
    pub counts: StatusCounts,
    pub filters: FilterState,
    pub search: String,
    /// Raw text of the newest snapshot seen, loaded or polled.
    pub last_seen_text: String,
    /// A polled change is waiting to be applied.
    pub refresh_available: bool,
    pub update_label: String,
    /// Full-page error; set when the initial load failed.
    pub load_error: Option<String>,
    pub loaded: bool,
    pub follow: FollowState,
    pub drawer_open: bool,
    pub tips_open: bool,
    pub notice: Option<Notice>,
}

impl DashboardState {
    fn new(filter: ViewFilter) -> Self {
        Self {
            classified: Vec::new(),
            counts: StatusCounts::default(),
            filters: FilterState::new(filter),
            search: String::new(),
            last_seen_text: String::new(),
            refresh_available: false,
            update_label: NO_UPDATE_PLACEHOLDER.to_string(),
            load_error: None,
            loaded: false,
            follow: FollowState::default(),
            drawer_open: false,
            tips_open: false,
            notice: None,
        }
    }
}

/// Wires UI events to the map, table and location service.
#[derive(Debug)]
pub struct Controller<M, T, L> {
    state: DashboardState,
    table: TableModel,
    map: M,
    table_view: T,
    location: L,
    settings: ControllerSettings,
}

impl<M: MapView, T: TableView, L: LocationService> Controller<M, T, L> {
    pub fn new(map: M, table_view: T, location: L, settings: ControllerSettings) -> Self {
        Self {
            state: DashboardState::new(settings.initial_filter),
            table: TableModel::default(),
            map,
            table_view,
            location,
            settings,
        }
    }

    #[must_use]
    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    #[must_use]
    pub fn sort(&self) -> SortState {
        self.table.sort()
    }

    #[must_use]
    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    #[must_use]
    pub fn table_view(&self) -> &T {
        &self.table_view
    }

    pub fn table_view_mut(&mut self) -> &mut T {
        &mut self.table_view
    }

    pub fn location_mut(&mut self) -> &mut L {
        &mut self.location
    }

    // ---- data ----

    /// Apply the outcome of the initial load.
    ///
    /// On failure the dashboard switches to the full-page error and stays
    /// there. Returns true if the dashboard is live.
    pub fn apply_initial_load(&mut self, result: Result<LoadedSnapshot, LoadError>) -> bool {
        match result {
            Ok(loaded) => {
                self.apply_snapshot(&loaded.snapshot);
                self.state.last_seen_text = loaded.raw;
                self.state.loaded = true;
                true
            }
            Err(e) => {
                self.state.load_error = Some(e.to_string());
                false
            }
        }
    }

    /// A poll fetched new text. Offers the refresh button if it differs from
    /// what was seen last.
    pub fn on_poll_change(&mut self, text: String) {
        if !self.state.loaded || text == self.state.last_seen_text {
            return;
        }
        debug!("New snapshot available");
        self.state.last_seen_text = text;
        self.state.refresh_available = true;
    }

    /// Apply the newest polled snapshot, keeping the viewport where it is.
    ///
    /// The refresh button is hidden afterwards even if the text turned out
    /// to be unusable.
    pub fn refresh(&mut self) -> Result<(), LoadError> {
        let viewport = self.map.viewport();
        let result = parse_snapshot(&self.state.last_seen_text).map(|snapshot| {
            self.apply_snapshot(&snapshot);
            self.map.set_viewport(viewport);
        });
        self.state.refresh_available = false;
        if let Err(e) = &result {
            warn!("Refresh skipped: {e}");
        }
        result
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let classified = classify_all(&snapshot.items);
        let counts = StatusCounts::tally(&classified);
        info!(
            "Classified {} ports: {} urgent, {} yellow, {} green",
            classified.len(),
            counts.urgent,
            counts.yellow,
            counts.green
        );

        if self
            .state
            .filters
            .apply_auto_default(counts.urgent, self.settings.urgent_threshold)
        {
            info!("Urgent backlog at {}, hiding untouched watch buckets", counts.urgent);
        }

        self.state.classified = classified;
        self.state.counts = counts;
        self.state.update_label = latest_update(&snapshot.items);

        self.table.set_data(&self.state.classified);
        self.table_view.set_rows(&self.state.classified);
        self.render_table();
        self.redraw_map();
    }

    fn redraw_map(&mut self) {
        let markers = build_markers(&self.state.classified, self.state.filters.filter());
        self.map.draw_markers(markers);
    }

    fn render_table(&mut self) {
        let visible = self.table.visible_rows(&self.state.search);
        self.table_view.render(&visible, self.table.sort());
    }

    // ---- filters, search and table ----

    pub fn set_show_yellow(&mut self, show: bool) {
        self.state.filters.set_yellow(show);
        self.redraw_map();
    }

    pub fn set_show_green(&mut self, show: bool) {
        self.state.filters.set_green(show);
        self.redraw_map();
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.state.search = text.into();
        self.render_table();
    }

    pub fn click_sort_header(&mut self, key: SortKey) {
        self.table.click_header(key);
        self.render_table();
    }

    /// A table row was clicked: bring its marker into view.
    pub fn row_clicked(&mut self, lat: f64, lng: f64, name: &str) {
        if !pan_to_and_open(&mut self.map, lat, lng, name) {
            debug!("No marker for '{name}', panned only");
        }
    }

    // ---- geolocation ----

    /// Ask for a single fix; the first one centers the map.
    pub fn request_location(&mut self) {
        self.location.request_fix();
    }

    /// Follow button: re-center on every update until the user moves the map.
    pub fn engage_follow(&mut self) {
        self.state.follow.engage();
        self.location.start_watch();
        self.location.request_fix();
    }

    /// The user dragged or zoomed the map.
    pub fn on_user_map_motion(&mut self) {
        if self.state.follow.disengage() {
            info!("Follow mode disengaged by map interaction");
            self.location.stop_watch();
        }
    }

    pub fn on_location_event(&mut self, event: LocationEvent, now: Instant) {
        match event {
            LocationEvent::Fix(fix) => {
                self.map.show_location(&fix);
                match self.state.follow.on_fix() {
                    FollowAction::CenterOnce | FollowAction::Recenter => self.map.pan_to(fix.position),
                    FollowAction::Stay => {}
                }
            }
            LocationEvent::Failed { origin, error } => {
                warn!("Geolocation failed ({origin:?}): {error}");
                // A failing watch keeps reporting; leave a visible notice alone.
                if origin == FixOrigin::OneShot || self.state.notice.is_none() {
                    self.raise_notice(format!("Unable to get current location: {error}"), now);
                }
            }
        }
    }

    // ---- chrome ----

    pub fn raise_notice(&mut self, text: impl Into<String>, now: Instant) {
        self.state.notice = Some(Notice {
            text: text.into(),
            raised_at: now,
        });
    }

    /// Drop the notice once it has been up long enough.
    pub fn expire_notice(&mut self, now: Instant) {
        let ttl = self.settings.notice_ttl;
        if self
            .state
            .notice
            .as_ref()
            .is_some_and(|n| now.saturating_duration_since(n.raised_at) >= ttl)
        {
            self.state.notice = None;
        }
    }

    pub fn open_drawer(&mut self) {
        self.state.drawer_open = true;
    }

    pub fn close_drawer(&mut self) {
        self.state.drawer_open = false;
    }

    pub fn open_tips(&mut self) {
        self.state.tips_open = true;
    }

    pub fn close_tips(&mut self) {
        self.state.tips_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::testing::RecordingLocation;
    use crate::geolocation::{GeolocationError, LocationFix};
    use crate::map::testing::RecordingMap;
    use crate::map::{LatLng, MarkerKey, Viewport};
    use crate::model::PortRecord;
    use crate::status::PortStatus;

    #[derive(Debug, Default)]
    struct RecordingTable {
        rows: usize,
        visible: Vec<String>,
        sort: SortState,
    }

    impl TableView for RecordingTable {
        fn set_rows(&mut self, rows: &[ClassifiedPort]) {
            self.rows = rows.len();
        }

        fn render(&mut self, visible: &[&ClassifiedPort], sort: SortState) {
            self.visible = visible.iter().map(|r| r.port.name.clone()).collect();
            self.sort = sort;
        }
    }

    type TestController = Controller<RecordingMap, RecordingTable, RecordingLocation>;

    fn controller() -> TestController {
        Controller::new(
            RecordingMap::new(),
            RecordingTable::default(),
            RecordingLocation::default(),
            ControllerSettings {
                initial_filter: ViewFilter {
                    show_yellow: true,
                    show_green: true,
                },
                ..ControllerSettings::default()
            },
        )
    }

    /// Snapshot with `urgent` heavy ports plus one yellow and one green.
    fn snapshot_text(urgent: usize) -> String {
        let mut items: Vec<PortRecord> = (0..urgent)
            .map(|i| {
                #[allow(clippy::cast_precision_loss, reason = "small index")]
                let lat = 35.0 + i as f64 * 0.001;
                PortRecord::new(format!("Urgent {i}"), lat, 135.7, 10.0, 1.0)
            })
            .collect();
        items.push(PortRecord::new("Yellow", 35.05, 135.75, 0.0, 3.0).with_updated("2025-05-02"));
        items.push(PortRecord::new("Green", 35.06, 135.76, 0.0, 2.0).with_updated("2025-05-01"));
        serde_json::to_string(&Snapshot {
            generated_at: None,
            items,
        })
        .unwrap()
    }

    fn loaded(text: &str) -> Result<LoadedSnapshot, LoadError> {
        Ok(LoadedSnapshot {
            snapshot: parse_snapshot(text).unwrap(),
            raw: text.to_string(),
        })
    }

    #[test]
    fn test_initial_load_fills_views() {
        let mut c = controller();
        assert!(c.apply_initial_load(loaded(&snapshot_text(2))));

        let state = c.state();
        assert_eq!(state.counts, StatusCounts { urgent: 2, yellow: 1, green: 1 });
        assert_eq!(state.update_label, "2025-05-02");
        assert_eq!(c.map().markers.len(), 4);
        assert_eq!(c.table_view().rows, 4);
        assert_eq!(c.table_view().sort, SortState::default());
    }

    #[test]
    fn test_initial_load_error_is_terminal() {
        let mut c = controller();
        assert!(!c.apply_initial_load(Err(LoadError::Flagged("sheet broken".into()))));
        assert_eq!(c.state().load_error.as_deref(), Some("sheet broken"));

        // Polls are ignored while the error page is up.
        c.on_poll_change(snapshot_text(1));
        assert!(!c.state().refresh_available);
        assert_eq!(c.map().draw_calls, 0);
    }

    #[test]
    fn test_auto_default_at_threshold() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(39)));
        assert!(c.state().filters.filter().show_yellow);
        assert!(c.state().filters.filter().show_green);

        c.on_poll_change(snapshot_text(40));
        c.refresh().unwrap();
        assert!(!c.state().filters.filter().show_yellow);
        assert!(!c.state().filters.filter().show_green);
        assert_eq!(c.map().markers.len(), 40);

        c.on_poll_change(snapshot_text(39));
        c.refresh().unwrap();
        assert!(!c.state().filters.filter().show_yellow);
        assert!(!c.state().filters.filter().show_green);
    }

    #[test]
    fn test_touched_checkbox_survives_auto_default() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));
        c.set_show_green(true);

        c.on_poll_change(snapshot_text(45));
        c.refresh().unwrap();
        assert!(!c.state().filters.filter().show_yellow);
        assert!(c.state().filters.filter().show_green);
        assert!(c
            .map()
            .markers
            .values()
            .any(|m| m.status == PortStatus::WatchGreen));
    }

    #[test]
    fn test_checkbox_toggle_redraws_map() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));
        let draws = c.map().draw_calls;

        c.set_show_yellow(false);
        assert_eq!(c.map().draw_calls, draws + 1);
        assert_eq!(c.map().markers.len(), 2);
        assert!(c.state().filters.yellow_touched());
    }

    #[test]
    fn test_poll_change_offers_refresh_only_on_difference() {
        let mut c = controller();
        let text = snapshot_text(1);
        c.apply_initial_load(loaded(&text));

        c.on_poll_change(text);
        assert!(!c.state().refresh_available);

        c.on_poll_change(snapshot_text(3));
        assert!(c.state().refresh_available);
        assert_eq!(c.state().counts.urgent, 1);
    }

    #[test]
    fn test_refresh_preserves_viewport_exactly() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));
        let viewport = Viewport {
            center: LatLng::new(35.012_345_678_9, 135.765_432_1),
            zoom: 14.372_1,
        };
        c.map_mut().set_viewport(viewport);

        c.on_poll_change(snapshot_text(5));
        c.refresh().unwrap();

        let after = c.map().viewport();
        assert_eq!(after.center.lat.to_bits(), viewport.center.lat.to_bits());
        assert_eq!(after.center.lng.to_bits(), viewport.center.lng.to_bits());
        assert_eq!(after.zoom.to_bits(), viewport.zoom.to_bits());
        assert_eq!(c.state().counts.urgent, 5);
        assert!(!c.state().refresh_available);
    }

    #[test]
    fn test_refresh_with_bad_text_still_hides_button() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));
        c.on_poll_change("{ truncated".to_string());
        assert!(c.refresh().is_err());
        assert!(!c.state().refresh_available);
        assert_eq!(c.state().counts.urgent, 1);
    }

    #[test]
    fn test_refresh_resets_sort() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));
        c.click_sort_header(SortKey::Name);
        assert_eq!(c.table_view().sort.key, SortKey::Name);

        c.on_poll_change(snapshot_text(2));
        c.refresh().unwrap();
        assert_eq!(c.table_view().sort, SortState::default());
    }

    #[test]
    fn test_search_filters_table() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(2)));
        c.set_search("yell");
        assert_eq!(c.table_view().visible, ["Yellow"]);
        c.set_search("");
        assert_eq!(c.table_view().visible.len(), 4);
    }

    #[test]
    fn test_row_click_opens_popup_or_just_pans() {
        let mut c = controller();
        c.apply_initial_load(loaded(&snapshot_text(1)));

        c.row_clicked(35.05, 135.75, "Yellow");
        assert_eq!(c.map().open_popup, Some(MarkerKey::new(35.05, 135.75, "Yellow")));

        c.set_show_yellow(false);
        c.row_clicked(35.05, 135.75, "Yellow");
        assert!(c.map().open_popup.is_none());
        assert_eq!(c.map().viewport().center, LatLng::new(35.05, 135.75));
    }

    #[test]
    fn test_first_fix_centers_once_then_stays() {
        let mut c = controller();
        let now = Instant::now();
        c.request_location();
        assert_eq!(c.location_mut().fix_requests, 1);

        c.on_location_event(LocationEvent::Fix(LocationFix::new(35.0, 135.7, None)), now);
        c.on_location_event(LocationEvent::Fix(LocationFix::new(35.1, 135.8, None)), now);

        assert_eq!(c.map().pans, vec![LatLng::new(35.0, 135.7)]);
        assert_eq!(
            c.map().location.map(|f| f.position),
            Some(LatLng::new(35.1, 135.8))
        );
    }

    #[test]
    fn test_follow_until_user_moves_map() {
        let mut c = controller();
        let now = Instant::now();
        c.engage_follow();
        assert!(c.state().follow.is_following());
        assert!(c.location_mut().watching);

        c.on_location_event(LocationEvent::Fix(LocationFix::new(35.0, 135.7, None)), now);
        c.on_location_event(LocationEvent::Fix(LocationFix::new(35.1, 135.8, None)), now);
        assert_eq!(c.map().pans.len(), 2);

        c.on_user_map_motion();
        assert!(!c.state().follow.is_following());
        assert!(!c.location_mut().watching);

        c.on_location_event(LocationEvent::Fix(LocationFix::new(35.2, 135.9, None)), now);
        assert_eq!(c.map().pans.len(), 2);

        // Moving the map again does not stop anything twice.
        c.on_user_map_motion();
        assert_eq!(c.location_mut().watch_stops, 1);
    }

    #[test]
    fn test_location_error_raises_transient_notice() {
        let mut c = controller();
        let now = Instant::now();
        c.on_location_event(
            LocationEvent::Failed {
                origin: FixOrigin::OneShot,
                error: GeolocationError::Timeout,
            },
            now,
        );
        assert!(c.state().notice.is_some());

        c.expire_notice(now + Duration::from_secs(1));
        assert!(c.state().notice.is_some());
        c.expire_notice(now + DEFAULT_NOTICE_TTL);
        assert!(c.state().notice.is_none());

        let later = now + DEFAULT_NOTICE_TTL;
        for at in [later, later + Duration::from_secs(2)] {
            c.on_location_event(
                LocationEvent::Failed {
                    origin: FixOrigin::Watch,
                    error: GeolocationError::Timeout,
                },
                at,
            );
        }
        assert_eq!(c.state().notice.as_ref().map(|n| n.raised_at), Some(later));
    }

    #[test]
    fn test_drawer_and_tips() {
        let mut c = controller();
        c.open_drawer();
        c.open_tips();
        assert!(c.state().drawer_open && c.state().tips_open);
        c.close_tips();
        c.close_drawer();
        assert!(!c.state().drawer_open && !c.state().tips_open);
    }
}
