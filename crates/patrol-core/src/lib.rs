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

//! Core library for the battery-swap port patrol dashboard.
//!
//! Everything in this crate is independent of the widget toolkit. The
//! dashboard is split into layers that can be used on their own or wired
//! together through the [`Controller`]:
//!
//! - **Classifier** ([`status`]): maps raw port metrics to a status tag
//! - **Data layer** ([`model`], [`loader`]): snapshot types, fetching and
//!   change polling
//! - **Views** ([`table`], [`map`]): sort/filter state for the port table,
//!   marker construction and the viewport for the map
//! - **Geolocation** ([`geolocation`]): location fixes and follow mode
//! - **Controller** ([`controller`]): owns the dashboard state and routes UI
//!   events to the views
//! - **Builder** ([`builder`]): turns a spreadsheet CSV export into the
//!   snapshot files the dashboard polls
//!
//! # Classifying ports
//!
//! ```
//! use patrol_core::status::{classify, PortStatus};
//!
//! assert_eq!(classify(12.0, 0.0, "Shijo"), Some(PortStatus::Urgent));
//! assert_eq!(classify(7.0, 2.0, "Sanjo"), Some(PortStatus::WatchYellow));
//! assert_eq!(classify(0.0, 2.0, "Gion"), Some(PortStatus::WatchGreen));
//! assert_eq!(classify(7.0, 1.0, "Demachi"), None);
//! ```
//!
//! # Sorting the table
//!
//! ```
//! use patrol_core::model::{ClassifiedPort, PortRecord};
//! use patrol_core::table::{SortKey, TableModel};
//!
//! let rows: Vec<ClassifiedPort> = [("B", 3.0), ("A", 9.0)]
//!     .into_iter()
//!     .map(|(name, weight)| {
//!         ClassifiedPort::new(PortRecord::new(name, 35.0, 135.7, weight, 1.0))
//!     })
//!     .collect();
//!
//! let mut table = TableModel::default();
//! table.set_data(&rows);
//! assert_eq!(table.visible_rows("")[0].port.name, "A");
//!
//! table.click_header(SortKey::Name);
//! assert_eq!(table.visible_rows("")[0].port.name, "B");
//! ```

pub mod builder;
pub mod controller;
pub mod filter;
pub mod geolocation;
pub mod loader;
pub mod map;
pub mod model;
pub mod status;
pub mod table;

pub use controller::{Controller, ControllerSettings, DashboardState, Notice};
pub use filter::{FilterState, ViewFilter};
pub use geolocation::{
    FixOrigin, FollowAction, FollowState, GeolocationError, LocationEvent, LocationFix,
    LocationProvider, LocationService, LocationWatcher,
};
pub use loader::{DataSource, HttpSource, LoadError, LoadedSnapshot, Poller};
pub use map::{LatLng, MapSettings, MapView, Marker, MarkerKey, Viewport};
pub use model::{ClassifiedPort, PortRecord, Snapshot};
pub use status::{classify, PortStatus, StatusCounts};
pub use table::{SortDirection, SortKey, SortState, TableModel, TableView};
