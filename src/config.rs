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

//! Application configuration management.
//!
//! Persistent settings are stored as TOML through `confy`. Every field has a
//! serde default so older or hand-edited files keep loading. Command line
//! flags are layered on top for a single session and never written back.

use std::time::Duration;

use patrol_core::map::MapSettings;
use patrol_core::{ControllerSettings, LatLng, ViewFilter};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "port-patrol";
const CONFIG_NAME: &str = "config";

/// Environment variable holding the Jawg Maps access token.
pub const JAWG_TOKEN_ENV: &str = "JAWG_ACCESS_TOKEN";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Snapshot document polled by the dashboard
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// Optional error-flag document checked before the first load
    #[serde(default)]
    pub error_url: Option<String>,

    /// Seconds between change checks
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,

    /// Urgent count at which untouched watch checkboxes turn off
    #[serde(default = "default_urgent_threshold")]
    pub urgent_auto_default_threshold: usize,

    /// Show yellow watch markers until the user or the backlog says otherwise
    #[serde(default = "default_true")]
    pub show_yellow: bool,

    /// Show green watch markers
    #[serde(default)]
    pub show_green: bool,

    /// Map region, initial view and zoom limits
    #[serde(default)]
    pub map: MapSettings,

    /// Jawg Maps access token (optional, env var takes precedence)
    #[serde(default)]
    pub jawg_access_token: Option<String>,

    /// Use IP geolocation for the locate button
    #[serde(default = "default_true")]
    pub geolocation_enabled: bool,

    /// Override location latitude (for fixed installations)
    #[serde(default)]
    pub override_latitude: Option<f64>,

    /// Override location longitude
    #[serde(default)]
    pub override_longitude: Option<f64>,

    /// Seconds between location updates while following
    #[serde(default = "default_follow_secs")]
    pub follow_interval_secs: u64,

    /// Port table panel width in pixels
    #[serde(default = "default_table_width")]
    pub table_panel_width: f32,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_data_url() -> String {
    "http://localhost:8000/data.json".to_string()
}

fn default_poll_secs() -> u64 {
    300
}

fn default_urgent_threshold() -> usize {
    40
}

fn default_true() -> bool {
    true
}

fn default_follow_secs() -> u64 {
    15
}

fn default_table_width() -> f32 {
    380.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            data_url: default_data_url(),
            error_url: None,
            poll_interval_secs: default_poll_secs(),
            urgent_auto_default_threshold: default_urgent_threshold(),
            show_yellow: true,
            show_green: false,
            map: MapSettings::default(),
            jawg_access_token: None,
            geolocation_enabled: true,
            override_latitude: None,
            override_longitude: None,
            follow_interval_secs: default_follow_secs(),
            table_panel_width: default_table_width(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    #[must_use]
    pub fn follow_interval(&self) -> Duration {
        Duration::from_secs(self.follow_interval_secs.max(1))
    }

    /// Fixed location, only when both halves are set.
    #[must_use]
    pub fn location_override(&self) -> Option<LatLng> {
        Some(LatLng::new(self.override_latitude?, self.override_longitude?))
    }

    /// A position can be had at all: lookups enabled or a fixed override.
    #[must_use]
    pub fn locate_on_start(&self) -> bool {
        self.geolocation_enabled || self.location_override().is_some()
    }

    /// Controller settings derived from this config.
    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            urgent_threshold: self.urgent_auto_default_threshold,
            initial_filter: ViewFilter {
                show_yellow: self.show_yellow,
                show_green: self.show_green,
            },
            ..ControllerSettings::default()
        }
    }

    /// Resolve the Jawg token: environment first, then config.
    #[must_use]
    pub fn resolve_jawg_token(&self) -> Option<String> {
        resolve_token(std::env::var(JAWG_TOKEN_ENV).ok(), self.jawg_access_token.as_deref())
    }
}

fn resolve_token(env_value: Option<String>, config_value: Option<&str>) -> Option<String> {
    env_value
        .filter(|key| !key.is_empty())
        .or_else(|| config_value.map(str::to_string).filter(|s| !s.is_empty()))
}
