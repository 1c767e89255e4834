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

//! Snapshot builder.
//!
//! Turns a CSV export of the patrol spreadsheet into the `data.json` file the
//! dashboard polls. Header names drift over time, so every logical column is
//! matched against a list of aliases with whitespace ignored. Rows that cannot
//! be read are skipped with a warning; a missing column fails the whole build.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{TimeDelta, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const LATLNG_ALIASES: &[&str] = &["プロット用緯度経度", "緯度経度", "latlng", "座標"];
const NAME_ALIASES: &[&str] = &["ポート名", "名称", "name"];
const UPDATED_ALIASES: &[&str] = &["更新日時", "更新日", "updated"];
const WEIGHT_ALIASES: &[&str] = &["電池交換比重", "比重", "weight"];
const COUNT_ALIASES: &[&str] = &["目安交換台数(電池4以下)", "目安交換台数", "台数", "count"];

/// Build timestamps are written in Japan Standard Time.
const JST_OFFSET_HOURS: i64 = 9;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Coordinates are compared at this many decimal places when deduplicating.
const DEDUPE_SCALE: f64 = 1e7;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no column matching any of {aliases:?} (header: {header:?})")]
    MissingColumn {
        aliases: &'static [&'static str],
        header: Vec<String>,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single row was skipped.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("expected 'lat,lng', got {0:?}")]
    LatLngShape(String),

    #[error("bad coordinate {0:?}")]
    Coordinate(String),
}

/// One port in the built snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub weight: i64,
    pub count: i64,
    pub updated: String,
}

/// The `data.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltSnapshot {
    pub generated_at: String,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Serialize)]
struct ErrorDocument<'a> {
    error: bool,
    message: &'a str,
    generated_at: &'a str,
}

/// Current time in JST, `YYYY-MM-DD HH:MM:SS`.
#[must_use]
pub fn now_jst() -> String {
    (Utc::now() + TimeDelta::hours(JST_OFFSET_HOURS))
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn normalize_header(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parse `"lat,lng"`. Full-width commas and whitespace also separate.
pub fn parse_latlng(s: &str) -> Result<(f64, f64), RowError> {
    let parts: Vec<&str> = s
        .split(|c: char| c == ',' || c == '，' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    let &[lat, lng] = parts.as_slice() else {
        return Err(RowError::LatLngShape(s.to_string()));
    };
    let parse = |p: &str| {
        p.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RowError::Coordinate(p.to_string()))
    };
    Ok((parse(lat)?, parse(lng)?))
}

/// Integer from a spreadsheet cell, going through a float so `"3.0"` and
/// `"3.7"` both work. Anything unreadable is 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, reason = "truncation is the intended rounding")]
pub fn to_int(s: &str) -> i64 {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map_or(0, |v| v.trunc() as i64)
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    latlng: usize,
    name: usize,
    updated: usize,
    weight: usize,
    count: usize,
}

impl Columns {
    fn resolve(header: &csv::StringRecord) -> Result<Self, BuildError> {
        let normalized: Vec<String> = header.iter().map(normalize_header).collect();
        let find = |aliases: &'static [&'static str]| {
            aliases
                .iter()
                .find_map(|alias| {
                    let alias = normalize_header(alias);
                    normalized.iter().position(|h| *h == alias)
                })
                .ok_or_else(|| BuildError::MissingColumn {
                    aliases,
                    header: header.iter().map(str::to_string).collect(),
                })
        };
        Ok(Self {
            latlng: find(LATLNG_ALIASES)?,
            name: find(NAME_ALIASES)?,
            updated: find(UPDATED_ALIASES)?,
            weight: find(WEIGHT_ALIASES)?,
            count: find(COUNT_ALIASES)?,
        })
    }
}

fn read_row(record: &csv::StringRecord, columns: Columns, build_time: &str) -> Result<Option<SnapshotItem>, RowError> {
    let cell = |i: usize| record.get(i).map_or("", str::trim);

    let (lat, lng) = parse_latlng(cell(columns.latlng))?;
    let name = cell(columns.name);
    if name.is_empty() {
        return Ok(None);
    }
    let updated = match cell(columns.updated) {
        "" => build_time,
        s => s,
    };
    Ok(Some(SnapshotItem {
        name: name.to_string(),
        lat,
        lng,
        weight: to_int(cell(columns.weight)),
        count: to_int(cell(columns.count)),
        updated: updated.to_string(),
    }))
}

#[allow(clippy::cast_possible_truncation, reason = "coordinates are tiny compared to i64")]
fn dedupe_key(item: &SnapshotItem) -> (i64, i64, String) {
    (
        (item.lat * DEDUPE_SCALE).round() as i64,
        (item.lng * DEDUPE_SCALE).round() as i64,
        item.name.clone(),
    )
}

/// Read the CSV export and produce deduplicated, sorted items.
///
/// `build_time` fills in rows without an update stamp.
pub fn transform<R: Read>(input: R, build_time: &str) -> Result<Vec<SnapshotItem>, BuildError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let header = reader.headers()?;
    if header.iter().all(|h| h.trim().is_empty()) {
        info!("Export has no header row, producing an empty snapshot");
        return Ok(Vec::new());
    }
    let columns = Columns::resolve(header)?;

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        match read_row(&record, columns, build_time) {
            Ok(Some(item)) => {
                if seen.insert(dedupe_key(&item)) {
                    items.push(item);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping row {}: {e}", line + 2),
        }
    }

    items.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then(b.count.cmp(&a.count))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(items)
}

/// Write `snapshot` unless the file already holds the same items.
///
/// `generated_at` alone never triggers a rewrite. Returns true if written.
pub fn write_if_changed(path: &Path, snapshot: &BuiltSnapshot) -> Result<bool, BuildError> {
    let text = serde_json::to_string_pretty(snapshot)?;
    if let Ok(existing) = fs::read_to_string(path) {
        let unchanged = existing == text
            || serde_json::from_str::<BuiltSnapshot>(&existing).is_ok_and(|old| old.items == snapshot.items);
        if unchanged {
            info!("{} unchanged, skipping write", path.display());
            return Ok(false);
        }
    }
    fs::write(path, text)?;
    Ok(true)
}

/// Write the error-flag document the dashboard checks before loading.
pub fn write_error(path: &Path, message: &str, generated_at: &str) -> Result<(), BuildError> {
    let doc = ErrorDocument {
        error: true,
        message,
        generated_at,
    };
    fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

/// Full build: CSV in, `data.json` out.
///
/// On failure the error document is written and `output` is left alone.
/// Returns whether `output` was rewritten.
pub fn run(input: &Path, output: &Path, error_path: &Path) -> Result<bool, BuildError> {
    let generated_at = now_jst();
    let result = fs::File::open(input)
        .map_err(BuildError::from)
        .and_then(|file| transform(file, &generated_at))
        .and_then(|items| {
            let count = items.len();
            let written = write_if_changed(output, &BuiltSnapshot { generated_at: generated_at.clone(), items })?;
            if written {
                info!("Wrote {} ({count} items)", output.display());
            }
            Ok(written)
        });

    if let Err(e) = &result {
        warn!("Build failed: {e}");
        write_error(error_path, &format!("build failed: {e}"), &generated_at)?;
    }
    result
}
