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

//! Geolocation: location fixes, follow mode and the background watch task.
//!
//! Where the fix comes from is up to a [`LocationProvider`]. The
//! [`LocationWatcher`] turns a provider into a one-shot request or a
//! continuous watch, delivering [`LocationEvent`]s over a channel. Only one
//! watch runs at a time; starting a new one cancels the old one first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::map::LatLng;

/// Accuracy assumed when the source does not report one.
pub const DEFAULT_ACCURACY_METERS: f64 = 30.0;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub position: LatLng,
    /// Radius of the 68% confidence circle in meters.
    pub accuracy_m: f64,
}

impl LocationFix {
    #[must_use]
    pub fn new(lat: f64, lng: f64, accuracy_m: Option<f64>) -> Self {
        Self {
            position: LatLng::new(lat, lng),
            accuracy_m: accuracy_m
                .filter(|a| a.is_finite() && *a > 0.0)
                .unwrap_or(DEFAULT_ACCURACY_METERS),
        }
    }
}

/// Why a location fix could not be obtained.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a location fix")]
    Timeout,

    #[error("location services are not supported on this system")]
    Unsupported,
}

/// Source of location fixes.
pub trait LocationProvider: Send + Sync + 'static {
    fn locate(&self) -> impl Future<Output = Result<LocationFix, GeolocationError>> + Send;
}

/// Which request produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOrigin {
    OneShot,
    Watch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(LocationFix),
    Failed {
        origin: FixOrigin,
        error: GeolocationError,
    },
}

/// Location capabilities the controller relies on.
pub trait LocationService {
    /// Ask for a single fix.
    fn request_fix(&mut self);

    /// Start continuous updates, replacing any running watch.
    fn start_watch(&mut self);

    /// Cancel the running watch, if any.
    fn stop_watch(&mut self);
}

/// What the map should do with a new fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    /// First fix of the session: center once.
    CenterOnce,
    /// Follow mode is on: keep the fix in the middle.
    Recenter,
    /// Just move the location dot.
    Stay,
}

/// One-shot centering plus follow mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    centered_once: bool,
    following: bool,
}

impl FollowState {
    #[must_use]
    pub fn is_following(&self) -> bool {
        self.following
    }

    pub fn engage(&mut self) {
        self.following = true;
    }

    /// Leave follow mode. Returns true if it was on.
    pub fn disengage(&mut self) -> bool {
        std::mem::replace(&mut self.following, false)
    }

    pub fn on_fix(&mut self) -> FollowAction {
        if self.following {
            self.centered_once = true;
            FollowAction::Recenter
        } else if !self.centered_once {
            self.centered_once = true;
            FollowAction::CenterOnce
        } else {
            FollowAction::Stay
        }
    }
}

/// Drives a [`LocationProvider`] on a tokio runtime.
pub struct LocationWatcher<P> {
    provider: Arc<P>,
    interval: Duration,
    runtime: Handle,
    events: mpsc::UnboundedSender<LocationEvent>,
    watch: Option<CancellationToken>,
}

impl<P> std::fmt::Debug for LocationWatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationWatcher")
            .field("interval", &self.interval)
            .field("watching", &self.watch.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: LocationProvider> LocationWatcher<P> {
    /// Create a watcher that spawns onto `runtime` and reports on `events`.
    #[must_use]
    pub fn new(
        provider: P,
        interval: Duration,
        runtime: Handle,
        events: mpsc::UnboundedSender<LocationEvent>,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            interval,
            runtime,
            events,
            watch: None,
        }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl<P: LocationProvider> LocationService for LocationWatcher<P> {
    fn request_fix(&mut self) {
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let event = match provider.locate().await {
                Ok(fix) => LocationEvent::Fix(fix),
                Err(error) => LocationEvent::Failed {
                    origin: FixOrigin::OneShot,
                    error,
                },
            };
            if events.send(event).is_err() {
                debug!("Location receiver dropped, discarding fix");
            }
        });
    }

    fn start_watch(&mut self) {
        self.stop_watch();

        let token = CancellationToken::new();
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        let interval = self.interval;
        let task_token = token.clone();

        info!("Starting location watch every {}s", interval.as_secs());
        self.runtime.spawn(async move {
            watch_loop(provider, interval, events, task_token).await;
        });
        self.watch = Some(token);
    }

    fn stop_watch(&mut self) {
        if let Some(token) = self.watch.take() {
            debug!("Stopping location watch");
            token.cancel();
        }
    }
}

impl<P> Drop for LocationWatcher<P> {
    fn drop(&mut self) {
        if let Some(token) = self.watch.take() {
            token.cancel();
        }
    }
}

async fn watch_loop<P: LocationProvider>(
    provider: Arc<P>,
    period: Duration,
    events: mpsc::UnboundedSender<LocationEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel_token.cancelled() => return,
            result = provider.locate() => result,
        };

        let event = match result {
            Ok(fix) => LocationEvent::Fix(fix),
            Err(error) => {
                warn!("Location watch error: {error}");
                LocationEvent::Failed {
                    origin: FixOrigin::Watch,
                    error,
                }
            }
        };
        if events.send(event).is_err() {
            return; // Receiver dropped
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Location service that only records calls.
    #[derive(Debug, Default)]
    pub struct RecordingLocation {
        pub fix_requests: usize,
        pub watch_starts: usize,
        pub watch_stops: usize,
        pub watching: bool,
    }

    impl LocationService for RecordingLocation {
        fn request_fix(&mut self) {
            self.fix_requests += 1;
        }

        fn start_watch(&mut self) {
            self.watch_starts += 1;
            self.watching = true;
        }

        fn stop_watch(&mut self) {
            self.watch_stops += 1;
            self.watching = false;
        }
    }
}
