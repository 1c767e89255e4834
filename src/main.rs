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

//! Port Patrol: desktop dashboard for battery-swap port patrols.

mod app;
mod carto_tiles;
mod config;
mod jawg_tiles;
mod location;
mod map_panel;
mod table_panel;
mod tiles;

use clap::Parser;
use log::{info, warn};

use crate::app::PatrolApp;
use crate::config::AppConfig;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(version, about = "Battery-swap port patrol dashboard")]
struct Args {
    /// Snapshot URL to load and poll
    #[arg(long)]
    data_url: Option<String>,

    /// Error-flag document checked before the first load
    #[arg(long)]
    error_url: Option<String>,

    /// Seconds between change checks
    #[arg(long)]
    poll_secs: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Layer command line flags over the stored config for this session.
    fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.data_url {
            config.data_url = url;
        }
        if let Some(url) = self.error_url {
            config.error_url = Some(url);
        }
        if let Some(secs) = self.poll_secs {
            config.poll_interval_secs = secs;
        }
    }
}

fn main() -> Result<(), eframe::Error> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }))
        .init();

    info!("Starting Port Patrol...");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    if let Ok(path) = AppConfig::get_config_path() {
        info!("Config file: {}", path.display());
    }
    args.apply(&mut config);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 860.0])
            .with_title("Port Patrol"),
        ..Default::default()
    };

    eframe::run_native(
        "Port Patrol",
        options,
        Box::new(move |cc| Ok(Box::new(PatrolApp::new(&cc.egui_ctx, &config)?))),
    )
}
