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

//! Snapshot loading and change polling.
//!
//! The initial load fails loudly with a [`LoadError`]. The background
//! [`Poller`] is the opposite: it swallows every failure and simply tries
//! again on the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::model::{PortRecord, Snapshot};

/// How often the poller checks for a new snapshot.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Shown when no record carries an update stamp.
pub const NO_UPDATE_PLACEHOLDER: &str = "-";

/// Errors that stop the dashboard from loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("snapshot request returned HTTP {0}")]
    Status(u16),

    #[error("malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    /// The publisher flagged the data as broken.
    #[error("{0}")]
    Flagged(String),
}

/// A decoded snapshot together with the exact text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub raw: String,
}

/// Transport for the snapshot and error-flag documents.
pub trait DataSource: Send + Sync + 'static {
    /// Fetch the raw snapshot text, bypassing caches.
    fn fetch_data(&self) -> impl Future<Output = Result<String, LoadError>> + Send;

    /// Fetch the raw error-flag text, `None` if there is no flag document.
    fn fetch_error_flag(&self) -> impl Future<Output = Result<Option<String>, LoadError>> + Send;
}

/// [`DataSource`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    data_url: String,
    error_url: Option<String>,
}

impl HttpSource {
    #[must_use]
    pub fn new(data_url: impl Into<String>, error_url: Option<String>) -> Self {
        Self::with_client(Client::new(), data_url, error_url)
    }

    #[must_use]
    pub fn with_client(client: Client, data_url: impl Into<String>, error_url: Option<String>) -> Self {
        Self {
            client,
            data_url: data_url.into(),
            error_url: error_url.filter(|u| !u.is_empty()),
        }
    }

    #[must_use]
    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

impl DataSource for HttpSource {
    async fn fetch_data(&self) -> Result<String, LoadError> {
        let url = cache_busted(&self.data_url, Utc::now().timestamp_millis());
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LoadError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn fetch_error_flag(&self) -> Result<Option<String>, LoadError> {
        let Some(url) = &self.error_url else {
            return Ok(None);
        };
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(LoadError::Status(status.as_u16())),
        }
    }
}

/// Append a `_=<millis>` query parameter.
#[must_use]
pub fn cache_busted(url: &str, millis: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}_={millis}")
}

/// `Some(message)` if the document is an `{ "error": true }` flag.
fn error_flag_message(value: &Value) -> Option<String> {
    if value.get("error").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    Some(
        value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("The data feed reported an error")
            .to_string(),
    )
}

/// Decode a snapshot document, honoring an embedded error flag.
pub fn parse_snapshot(text: &str) -> Result<Snapshot, LoadError> {
    let value: Value = serde_json::from_str(text)?;
    if let Some(message) = error_flag_message(&value) {
        return Err(LoadError::Flagged(message));
    }
    Ok(serde_json::from_value(value)?)
}

/// Fail if the optional error-flag document says so.
///
/// A missing or unreadable flag document never blocks loading.
pub async fn check_error_flag<S: DataSource>(source: &S) -> Result<(), LoadError> {
    let text = match source.fetch_error_flag().await {
        Ok(Some(text)) => text,
        Ok(None) => return Ok(()),
        Err(e) => {
            debug!("Error flag unavailable: {e}");
            return Ok(());
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => match error_flag_message(&value) {
            Some(message) => Err(LoadError::Flagged(message)),
            None => Ok(()),
        },
        Err(e) => {
            debug!("Ignoring unreadable error flag: {e}");
            Ok(())
        }
    }
}

/// Fetch and decode the current snapshot.
pub async fn load<S: DataSource>(source: &S) -> Result<LoadedSnapshot, LoadError> {
    let raw = source.fetch_data().await?;
    let snapshot = parse_snapshot(&raw)?;
    info!("Loaded snapshot with {} ports", snapshot.items.len());
    Ok(LoadedSnapshot { snapshot, raw })
}

/// Initial load: error flag first, then the snapshot.
pub async fn bootstrap<S: DataSource>(source: &S) -> Result<LoadedSnapshot, LoadError> {
    let result = async {
        check_error_flag(source).await?;
        load(source).await
    }
    .await;
    if let Err(e) = &result {
        error!("Initial load failed: {e}");
    }
    result
}

/// Newest `updated` stamp, compared as plain strings.
#[must_use]
pub fn latest_update(items: &[PortRecord]) -> String {
    items
        .iter()
        .filter_map(|item| item.updated.as_deref())
        .filter(|s| !s.is_empty())
        .max()
        .unwrap_or(NO_UPDATE_PLACEHOLDER)
        .to_string()
}

/// Background task reporting snapshot text changes.
///
/// The task is cancelled by [`Poller::shutdown`] or when the handle drops.
pub struct Poller {
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("cancel_token", &self.cancel_token)
            .finish()
    }
}

impl Poller {
    /// Start polling. Must be called from within a tokio runtime.
    ///
    /// The first check happens one `interval` after start. `on_change` runs
    /// once for every fetched text that differs from the previous one,
    /// starting from `baseline`.
    #[must_use]
    pub fn spawn<S, F>(source: Arc<S>, interval: Duration, baseline: Option<String>, on_change: F) -> Self
    where
        S: DataSource,
        F: FnMut(String) + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();

        info!("Polling for snapshot changes every {}s", interval.as_secs());
        tokio::spawn(async move {
            poll_loop(source, interval, baseline.unwrap_or_default(), on_change, task_token).await;
        });

        Self { cancel_token }
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn poll_loop<S, F>(
    source: Arc<S>,
    period: Duration,
    mut baseline: String,
    mut on_change: F,
    cancel_token: CancellationToken,
) where
    S: DataSource,
    F: FnMut(String) + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                debug!("Poller cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel_token.cancelled() => return,
            result = source.fetch_data() => result,
        };

        match result {
            Ok(text) if !text.is_empty() && text != baseline => {
                debug!("Snapshot changed ({} bytes)", text.len());
                baseline.clone_from(&text);
                on_change(text);
            }
            Ok(_) => {}
            Err(e) => debug!("Poll failed, retrying next tick: {e}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted data source. Once the script runs out the last data response
    /// repeats.
    #[derive(Debug, Default)]
    pub struct ScriptedSource {
        data: Mutex<VecDeque<Result<String, u16>>>,
        last: Mutex<Option<Result<String, u16>>>,
        pub error_flag: Option<String>,
        pub fetches: Mutex<usize>,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Result<&str, u16>>) -> Self {
            Self {
                data: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
                ..Self::default()
            }
        }

        pub fn with_error_flag(mut self, flag: &str) -> Self {
            self.error_flag = Some(flag.to_string());
            self
        }

        pub fn fetch_count(&self) -> usize {
            *self.fetches.lock().unwrap()
        }
    }

    impl DataSource for ScriptedSource {
        async fn fetch_data(&self) -> Result<String, LoadError> {
            *self.fetches.lock().unwrap() += 1;
            let next = self.data.lock().unwrap().pop_front();
            let response = match next {
                Some(r) => {
                    *self.last.lock().unwrap() = Some(r.clone());
                    r
                }
                None => self.last.lock().unwrap().clone().unwrap_or(Err(503)),
            };
            response.map_err(LoadError::Status)
        }

        async fn fetch_error_flag(&self) -> Result<Option<String>, LoadError> {
            Ok(self.error_flag.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::ScriptedSource;
    use super::*;

    const SNAPSHOT_A: &str = r#"{"items":[{"name":"A","lat":35.0,"lng":135.7,"weight":3,"count":2}]}"#;
    const SNAPSHOT_B: &str = r#"{"items":[{"name":"B","lat":35.1,"lng":135.8,"weight":11,"count":0}]}"#;

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(String) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |text| sink.lock().unwrap().push(text))
    }

    #[test]
    fn test_cache_busted() {
        assert_eq!(cache_busted("./data.json", 42), "./data.json?_=42");
        assert_eq!(cache_busted("https://x/data.json?v=1", 42), "https://x/data.json?v=1&_=42");
    }

    #[test]
    fn test_parse_snapshot_error_flag() {
        let err = parse_snapshot(r#"{"error":true,"message":"sheet broken"}"#).unwrap_err();
        assert!(matches!(err, LoadError::Flagged(m) if m == "sheet broken"));

        let ok = parse_snapshot(r#"{"error":false,"items":[]}"#).unwrap();
        assert!(ok.items.is_empty());

        assert!(matches!(parse_snapshot("not json"), Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_latest_update() {
        let items = vec![
            PortRecord::new("a", 0.0, 0.0, 0.0, 0.0).with_updated("2025-05-01 08:00:00"),
            PortRecord::new("b", 0.0, 0.0, 0.0, 0.0),
            PortRecord::new("c", 0.0, 0.0, 0.0, 0.0).with_updated("2025-05-02 07:00:00"),
        ];
        assert_eq!(latest_update(&items), "2025-05-02 07:00:00");
        assert_eq!(latest_update(&items[1..2]), NO_UPDATE_PLACEHOLDER);
        assert_eq!(latest_update(&[]), NO_UPDATE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_bootstrap_honors_error_flag() {
        let source = ScriptedSource::new(vec![Ok(SNAPSHOT_A)])
            .with_error_flag(r#"{"error":true,"message":"build failed"}"#);
        let err = bootstrap(&source).await.unwrap_err();
        assert!(matches!(err, LoadError::Flagged(m) if m == "build failed"));
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_ignores_cleared_or_garbled_flag() {
        let source = ScriptedSource::new(vec![Ok(SNAPSHOT_A)]).with_error_flag(r#"{"error":false}"#);
        let loaded = bootstrap(&source).await.unwrap();
        assert_eq!(loaded.raw, SNAPSHOT_A);
        assert_eq!(loaded.snapshot.items.len(), 1);

        let source = ScriptedSource::new(vec![Ok(SNAPSHOT_A)]).with_error_flag("<html>");
        assert!(bootstrap(&source).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_fails_on_status() {
        let source = ScriptedSource::new(vec![Err(500)]);
        assert!(matches!(load(&source).await, Err(LoadError::Status(500))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reports_each_change_once() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(SNAPSHOT_A),
            Ok(SNAPSHOT_A),
            Ok(SNAPSHOT_B),
            Ok(SNAPSHOT_B),
        ]));
        let (seen, on_change) = collector();
        let period = Duration::from_secs(300);
        let _poller = Poller::spawn(Arc::clone(&source), period, Some(SNAPSHOT_A.to_string()), on_change);

        // Nothing happens before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(source.fetch_count(), 0);

        tokio::time::sleep(Duration::from_secs(300 * 4)).await;
        assert_eq!(source.fetch_count(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![SNAPSHOT_B.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_swallows_failures_and_keeps_going() {
        let source = Arc::new(ScriptedSource::new(vec![Err(502), Ok(""), Err(404), Ok(SNAPSHOT_B)]));
        let (seen, on_change) = collector();
        let period = Duration::from_secs(60);
        let _poller = Poller::spawn(Arc::clone(&source), period, Some(SNAPSHOT_A.to_string()), on_change);

        tokio::time::sleep(Duration::from_secs(60 * 4 + 1)).await;
        assert_eq!(source.fetch_count(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![SNAPSHOT_B.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_on_shutdown() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(SNAPSHOT_B)]));
        let (seen, on_change) = collector();
        let poller = Poller::spawn(Arc::clone(&source), Duration::from_secs(10), None, on_change);

        poller.shutdown();
        assert!(!poller.is_running());
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.fetch_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }
}
