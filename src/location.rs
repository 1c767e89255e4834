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

//! Desktop location provider.
//!
//! A configured override wins. Otherwise the position comes from IP
//! geolocation, trying ipapi.co first and ip-api.com as a fallback.

use std::time::Duration;

use log::{debug, info};
use patrol_core::{GeolocationError, LatLng, LocationFix, LocationProvider};
use reqwest::Client;
use serde_json::Value;

const IPAPI_URL: &str = "https://ipapi.co/json/";
const IP_API_URL: &str = "http://ip-api.com/json/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// IP lookups are city-level at best.
const IP_ACCURACY_METERS: f64 = 5_000.0;

/// Accuracy reported for a configured override.
const OVERRIDE_ACCURACY_METERS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct DesktopLocationProvider {
    client: Client,
    enabled: bool,
    override_position: Option<LatLng>,
}

impl DesktopLocationProvider {
    #[must_use]
    pub fn new(enabled: bool, override_position: Option<LatLng>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            enabled,
            override_position,
        }
    }

    async fn lookup(&self, url: &str, lat_key: &str, lon_key: &str) -> Result<LocationFix, GeolocationError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                GeolocationError::Timeout
            } else {
                GeolocationError::Unavailable(e.to_string())
            }
        })?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| GeolocationError::Unavailable(e.to_string()))?;
        parse_position(&value, lat_key, lon_key)
            .map(|p| LocationFix::new(p.lat, p.lng, Some(IP_ACCURACY_METERS)))
            .ok_or_else(|| GeolocationError::Unavailable(format!("no coordinates in response from {url}")))
    }
}

fn parse_position(value: &Value, lat_key: &str, lon_key: &str) -> Option<LatLng> {
    let lat = value.get(lat_key).and_then(Value::as_f64)?;
    let lon = value.get(lon_key).and_then(Value::as_f64)?;
    Some(LatLng::new(lat, lon))
}

impl LocationProvider for DesktopLocationProvider {
    async fn locate(&self) -> Result<LocationFix, GeolocationError> {
        if let Some(position) = self.override_position {
            return Ok(LocationFix::new(position.lat, position.lng, Some(OVERRIDE_ACCURACY_METERS)));
        }
        if !self.enabled {
            return Err(GeolocationError::Unsupported);
        }

        match self.lookup(IPAPI_URL, "latitude", "longitude").await {
            Ok(fix) => {
                info!("Location found via ipapi.co");
                Ok(fix)
            }
            Err(e) => {
                debug!("ipapi.co lookup failed: {e}");
                let fix = self.lookup(IP_API_URL, "lat", "lon").await?;
                info!("Location found via ip-api.com");
                Ok(fix)
            }
        }
    }
}
