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

//! The dashboard window.
//!
//! Network work runs on a tokio runtime owned by the app. Results come back
//! over channels that are drained at the start of every frame, so the
//! controller is only ever touched from the UI thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::{Align2, Color32, RichText};
use log::{info, warn};
use patrol_core::loader::bootstrap;
use patrol_core::status::PortStatus;
use patrol_core::{
    Controller, DashboardState, HttpSource, LoadError, LoadedSnapshot, LocationEvent, LocationService,
    LocationWatcher, MapView, Poller, TableView,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::carto_tiles::CartoLightSource;
use crate::config::AppConfig;
use crate::jawg_tiles::JawgSunnySource;
use crate::location::DesktopLocationProvider;
use crate::map_panel::MapPanel;
use crate::table_panel::TablePanel;
use crate::tiles::TileManager;

const NOTICE_REPAINT: Duration = Duration::from_millis(500);

type DashboardController = Controller<MapPanel, TablePanel, LocationWatcher<DesktopLocationProvider>>;

enum AppEvent {
    Loaded(Result<LoadedSnapshot, LoadError>),
    PollChanged(String),
}

pub struct PatrolApp {
    controller: DashboardController,
    source: Arc<HttpSource>,
    poll_interval: Duration,
    poller: Option<Poller>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    location_rx: mpsc::UnboundedReceiver<LocationEvent>,
    table_width: f32,
    runtime: Runtime,
}

impl std::fmt::Debug for PatrolApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatrolApp")
            .field("data_url", &self.source.data_url())
            .field("polling", &self.poller.is_some())
            .finish_non_exhaustive()
    }
}

fn tile_manager(config: &AppConfig) -> TileManager {
    if let Some(token) = config.resolve_jawg_token() {
        info!("Using Jawg Sunny tiles");
        TileManager::new(Box::new(JawgSunnySource::new(token)), "jawg-sunny")
    } else {
        info!("No Jawg token configured, using Carto light tiles");
        TileManager::new(Box::new(CartoLightSource), "carto-light")
    }
}

/// One-shot fix at start; the first position centers the map.
fn locate_on_start<M: MapView, T: TableView, L: LocationService>(
    controller: &mut Controller<M, T, L>,
    config: &AppConfig,
) {
    if config.locate_on_start() {
        controller.request_location();
    } else {
        info!("Geolocation disabled, not locating on start");
    }
}

fn status_color(status: PortStatus) -> Color32 {
    let (r, g, b) = status.color();
    Color32::from_rgb(r, g, b)
}

impl PatrolApp {
    pub fn new(ctx: &egui::Context, config: &AppConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("patrol-io")
            .enable_all()
            .build()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (location_tx, location_rx) = mpsc::unbounded_channel();

        let provider = DesktopLocationProvider::new(config.geolocation_enabled, config.location_override());
        let location = LocationWatcher::new(provider, config.follow_interval(), runtime.handle().clone(), location_tx);

        let mut controller = Controller::new(
            MapPanel::new(config.map, tile_manager(config)),
            TablePanel::default(),
            location,
            config.controller_settings(),
        );
        locate_on_start(&mut controller, config);

        let source = Arc::new(HttpSource::new(config.data_url.clone(), config.error_url.clone()));
        info!("Loading snapshot from {}", source.data_url());
        {
            let source = Arc::clone(&source);
            let tx = events_tx.clone();
            let ctx = ctx.clone();
            runtime.spawn(async move {
                let result = bootstrap(&*source).await;
                let _ = tx.send(AppEvent::Loaded(result));
                ctx.request_repaint();
            });
        }

        Ok(Self {
            controller,
            source,
            poll_interval: config.poll_interval(),
            poller: None,
            events_tx,
            events_rx,
            location_rx,
            table_width: config.table_panel_width,
            runtime,
        })
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::Loaded(result) => {
                    let baseline = result.as_ref().ok().map(|loaded| loaded.raw.clone());
                    if self.controller.apply_initial_load(result) {
                        self.start_polling(ctx, baseline);
                    }
                }
                AppEvent::PollChanged(text) => self.controller.on_poll_change(text),
            }
        }

        let now = Instant::now();
        while let Ok(event) = self.location_rx.try_recv() {
            self.controller.on_location_event(event, now);
        }
        self.controller.expire_notice(now);
    }

    fn start_polling(&mut self, ctx: &egui::Context, baseline: Option<String>) {
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        let _guard = self.runtime.enter();
        self.poller = Some(Poller::spawn(
            Arc::clone(&self.source),
            self.poll_interval,
            baseline,
            move |text| {
                let _ = tx.send(AppEvent::PollChanged(text));
                ctx.request_repaint();
            },
        ));
    }

    fn show_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("☰").on_hover_text("Filters and legend").clicked() {
                    if self.controller.state().drawer_open {
                        self.controller.close_drawer();
                    } else {
                        self.controller.open_drawer();
                    }
                }
                ui.label(RichText::new("Port Patrol").strong().size(15.0));
                ui.separator();

                let state = self.controller.state();
                let counts = state.counts;
                for (status, n) in [
                    (PortStatus::Urgent, counts.urgent),
                    (PortStatus::WatchYellow, counts.yellow),
                    (PortStatus::WatchGreen, counts.green),
                ] {
                    ui.label(RichText::new(format!("● {n}")).color(status_color(status)))
                        .on_hover_text(status.label());
                }
                ui.separator();
                ui.label(RichText::new(format!("Updated {}", state.update_label)).weak());
                let refresh_available = state.refresh_available;
                let following = state.follow.is_following();

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("?").on_hover_text("How ports are classified").clicked() {
                        self.controller.open_tips();
                    }

                    let locate = if following {
                        RichText::new("◉ Following").color(Color32::from_rgb(0x1e, 0x88, 0xe5))
                    } else {
                        RichText::new("◎ Locate")
                    };
                    if ui.button(locate).on_hover_text("Show and follow my location").clicked() {
                        self.controller.engage_follow();
                    }

                    if refresh_available
                        && ui
                            .button(RichText::new("⟳ Refresh ●").color(Color32::from_rgb(0xe6, 0x00, 0x26)))
                            .on_hover_text("New data is available")
                            .clicked()
                    {
                        if let Err(e) = self.controller.refresh() {
                            self.controller.raise_notice(format!("Could not apply new data: {e}"), Instant::now());
                        }
                    }
                });
            });
        });
    }

    fn show_drawer(&mut self, ctx: &egui::Context) {
        if !self.controller.state().drawer_open {
            return;
        }
        egui::SidePanel::left("drawer").resizable(false).default_width(200.0).show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Filters");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("✕").clicked() {
                        self.controller.close_drawer();
                    }
                });
            });

            let filter = self.controller.state().filters.filter();
            let mut show_yellow = filter.show_yellow;
            if ui.checkbox(&mut show_yellow, PortStatus::WatchYellow.label()).changed() {
                self.controller.set_show_yellow(show_yellow);
            }
            let mut show_green = filter.show_green;
            if ui.checkbox(&mut show_green, PortStatus::WatchGreen.label()).changed() {
                self.controller.set_show_green(show_green);
            }

            ui.separator();
            ui.heading("Legend");
            for status in [PortStatus::Urgent, PortStatus::WatchYellow, PortStatus::WatchGreen] {
                ui.horizontal(|ui| {
                    ui.label(RichText::new("●").color(status_color(status)));
                    ui.label(status.label());
                });
            }
            ui.label(RichText::new("Marker size grows with the unit count.").weak().small());
        });
    }

    fn show_table(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("ports")
            .resizable(true)
            .default_width(self.table_width)
            .show(ctx, |ui| {
                let mut search = self.controller.state().search.clone();
                ui.horizontal(|ui| {
                    ui.label("🔍");
                    if ui
                        .add(egui::TextEdit::singleline(&mut search).hint_text("Search ports"))
                        .changed()
                    {
                        self.controller.set_search(search);
                    }
                });
                let table = self.controller.table_view();
                ui.label(RichText::new(format!("{} of {} ports", table.visible_count(), table.total())).weak());
                ui.separator();

                let response = self.controller.table_view().show(ui);
                if let Some(key) = response.header_clicked {
                    self.controller.click_sort_header(key);
                }
                if let Some(row) = response.row_clicked {
                    self.controller.row_clicked(row.lat, row.lng, &row.name);
                }
            });
    }

    fn show_map(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().frame(egui::Frame::NONE).show(ctx, |ui| {
            let response = self.controller.map_mut().show(ui);
            if response.user_moved {
                self.controller.on_user_map_motion();
            }
            if let Some(url) = response.open_url {
                if let Err(e) = webbrowser::open(&url) {
                    warn!("Failed to open browser: {e}");
                }
            }
        });
    }

    fn show_tips(&mut self, ctx: &egui::Context) {
        if !self.controller.state().tips_open {
            return;
        }
        let modal = egui::Modal::new(egui::Id::new("tips")).show(ctx, |ui| {
            ui.set_max_width(360.0);
            ui.heading("Classification");
            tip(ui, PortStatus::Urgent, "Battery weight 10 or more, or a unit left outside its port.");
            tip(ui, PortStatus::WatchYellow, "3 or more units, or 2 units with weight 5 to 9.");
            tip(ui, PortStatus::WatchGreen, "2 units otherwise.");
            ui.add_space(6.0);
            ui.label(
                RichText::new("When the urgent backlog is large the watch layers start hidden unless you toggled them.")
                    .weak()
                    .small(),
            );
            ui.add_space(6.0);
            ui.button("Close").clicked()
        });
        if modal.inner || modal.should_close() {
            self.controller.close_tips();
        }
    }

    fn show_notice(&self, ctx: &egui::Context) {
        let Some(notice) = &self.controller.state().notice else {
            return;
        };
        egui::Area::new(egui::Id::new("notice"))
            .anchor(Align2::CENTER_BOTTOM, egui::vec2(0.0, -24.0))
            .order(egui::Order::Tooltip)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style())
                    .fill(Color32::from_rgba_unmultiplied(30, 30, 30, 230))
                    .show(ui, |ui| {
                        ui.label(RichText::new(&notice.text).color(Color32::WHITE));
                    });
            });
        ctx.request_repaint_after(NOTICE_REPAINT);
    }
}

fn tip(ui: &mut egui::Ui, status: PortStatus, text: &str) {
    ui.horizontal_wrapped(|ui| {
        ui.label(RichText::new(format!("● {}", status.label())).color(status_color(status)).strong());
        ui.label(text);
    });
}

fn show_load_error(ctx: &egui::Context, state: &DashboardState) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() / 3.0);
            ui.heading(RichText::new("Data could not be loaded").color(Color32::from_rgb(0xe6, 0x00, 0x26)));
            if let Some(message) = &state.load_error {
                ui.label(message);
            }
            ui.label(RichText::new("Restart the dashboard once the feed is back.").weak());
        });
    });
}

impl eframe::App for PatrolApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        let state = self.controller.state();
        if state.load_error.is_some() {
            show_load_error(ctx, state);
            return;
        }
        if !state.loaded {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(egui::Ui::spinner);
            });
            return;
        }

        self.show_header(ctx);
        self.show_drawer(ctx);
        self.show_table(ctx);
        self.show_map(ctx);
        self.show_tips(ctx);
        self.show_notice(ctx);
    }
}
