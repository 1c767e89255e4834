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

//! Slippy-map tiles: projection helpers plus a texture cache backed by disk.
//!
//! Tiles are fetched on short-lived background threads and written to the
//! user cache directory, keyed by the SHA-256 of their URL. Anything older
//! than a week is removed when the manager starts.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use egui::{ColorImage, TextureHandle, TextureOptions};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

pub const TILE_SIZE: f32 = 256.0;
const CACHE_DURATION_DAYS: u64 = 7;

/// Web Mercator projection in tile units (one unit per tile at `zoom`).
#[derive(Debug)]
pub struct WebMercator;

impl WebMercator {
    /// Latitude to tile-space Y.
    #[must_use]
    pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
        let lat_rad = lat.to_radians();
        let n = zoom.exp2();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0;
        y * n
    }

    /// Longitude to tile-space X.
    #[must_use]
    pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        ((lon + 180.0) / 360.0) * n
    }

    /// Tile-space Y back to latitude.
    #[must_use]
    pub fn y_to_lat(y: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh().atan();
        lat_rad.to_degrees()
    }

    /// Tile-space X back to longitude.
    #[must_use]
    pub fn x_to_lon(x: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        x / n * 360.0 - 180.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    #[must_use]
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    fn tile_id(self) -> TileId {
        TileId {
            x: self.x,
            y: self.y,
            zoom: self.zoom,
        }
    }
}

/// `zoom/x/y`, for logs. Tile URLs may carry an access token.
impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Cache filename for a tile URL.
fn cache_filename(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}.png", hasher.finalize())
}

enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

type TileMap = Arc<Mutex<HashMap<TileCoord, TileState>>>;

fn lock(tiles: &Mutex<HashMap<TileCoord, TileState>>) -> MutexGuard<'_, HashMap<TileCoord, TileState>> {
    tiles.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Visible tile with its top-left offset from the viewport center, in
/// pixels at the tile's own zoom.
pub type VisibleTile = (TileCoord, f32, f32);

pub struct TileManager {
    source: Box<dyn TileSource + Send>,
    cache_dir: PathBuf,
    tiles: TileMap,
    in_flight: Arc<Mutex<HashSet<TileCoord>>>,
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("cache_dir", &self.cache_dir)
            .field("attribution", &self.source.attribution().text)
            .finish_non_exhaustive()
    }
}

impl TileManager {
    /// Create a manager for `source`, caching under `<cache>/port-patrol/tiles/<name>`.
    #[must_use]
    pub fn new(source: Box<dyn TileSource + Send>, name: &str) -> Self {
        let cache_dir = Self::get_cache_dir(name);

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create tile cache directory {}: {e}", cache_dir.display());
        }

        let removed = cleanup_old_tiles(&cache_dir, Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60));
        if removed > 0 {
            info!("Removed {removed} stale tiles from cache");
        }

        Self {
            source,
            cache_dir,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn get_cache_dir(name: &str) -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        path.push(crate::config::APP_NAME);
        path.push("tiles");
        path.push(name);
        path
    }

    #[must_use]
    pub fn attribution(&self) -> Attribution {
        self.source.attribution()
    }

    #[must_use]
    pub fn max_zoom(&self) -> u8 {
        self.source.max_zoom()
    }

    /// Get tile from memory or disk cache, or queue it for download.
    pub fn get_tile(&self, coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
        let mut tiles = lock(&self.tiles);
        match tiles.get(&coord) {
            Some(TileState::Loaded(texture)) => return Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => return None,
            None => {}
        }

        let url = self.source.tile_url(coord.tile_id());
        let cache_path = self.cache_dir.join(cache_filename(&url));
        if cache_path.exists() {
            match fs::read(&cache_path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| load_texture(&bytes, ctx, coord))
            {
                Ok(texture) => {
                    tiles.insert(coord, TileState::Loaded(texture.clone()));
                    return Some(texture);
                }
                Err(e) => debug!("Discarding cached tile {}: {e}", cache_path.display()),
            }
        }

        tiles.insert(coord, TileState::Loading);
        drop(tiles);
        self.queue_download(coord, url, cache_path, ctx.clone());
        None
    }

    fn queue_download(&self, coord: TileCoord, url: String, cache_path: PathBuf, ctx: egui::Context) {
        if !self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(coord)
        {
            return;
        }

        let tiles = Arc::clone(&self.tiles);
        let in_flight = Arc::clone(&self.in_flight);
        std::thread::spawn(move || {
            let state = match download_tile(&url, &cache_path, &ctx, coord) {
                Ok(texture) => TileState::Loaded(texture),
                Err(e) => {
                    warn!("Failed to load tile {}/{}/{}: {e}", coord.zoom, coord.x, coord.y);
                    TileState::Failed
                }
            };
            lock(&tiles).insert(coord, state);
            in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&coord);
            ctx.request_repaint();
        });
    }

    /// Tiles covering a `width` x `height` pixel viewport centered on
    /// (`center_lat`, `center_lon`) at integer `zoom`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss, reason = "tile indices are small and range-checked")]
    pub fn get_visible_tiles(center_lat: f64, center_lon: f64, zoom: u8, width: f32, height: f32) -> Vec<VisibleTile> {
        let z = f64::from(zoom);
        let center_tile_x = WebMercator::lon_to_x(center_lon, z);
        let center_tile_y = WebMercator::lat_to_y(center_lat, z);

        let tiles_wide = (width / TILE_SIZE).ceil() as i64 + 2;
        let tiles_high = (height / TILE_SIZE).ceil() as i64 + 2;

        let start_x = center_tile_x.floor() as i64 - tiles_wide / 2;
        let start_y = center_tile_y.floor() as i64 - tiles_high / 2;

        let max_tile = 1_i64 << zoom;

        let mut tiles = Vec::new();
        for dy in 0..tiles_high {
            for dx in 0..tiles_wide {
                let tile_x = start_x + dx;
                let tile_y = start_y + dy;
                if !(0..max_tile).contains(&tile_x) || !(0..max_tile).contains(&tile_y) {
                    continue;
                }
                let offset_x = (tile_x as f64 - center_tile_x) * f64::from(TILE_SIZE);
                let offset_y = (tile_y as f64 - center_tile_y) * f64::from(TILE_SIZE);
                tiles.push((
                    TileCoord::new(tile_x as u32, tile_y as u32, zoom),
                    offset_x as f32,
                    offset_y as f32,
                ));
            }
        }
        tiles
    }

    #[must_use]
    pub fn has_loading_tiles(&self) -> bool {
        lock(&self.tiles).values().any(|state| matches!(state, TileState::Loading))
    }

    #[must_use]
    pub fn get_error_count(&self) -> usize {
        lock(&self.tiles)
            .values()
            .filter(|state| matches!(state, TileState::Failed))
            .count()
    }
}

fn download_tile(url: &str, cache_path: &Path, ctx: &egui::Context, coord: TileCoord) -> Result<TextureHandle, String> {
    debug!("Downloading tile {coord}");
    let response = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    if let Err(e) = fs::write(cache_path, &bytes) {
        warn!("Failed to save tile to cache: {e}");
    }
    load_texture(&bytes, ctx, coord)
}

fn load_texture(bytes: &[u8], ctx: &egui::Context, coord: TileCoord) -> Result<TextureHandle, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let color_image = ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw());

    Ok(ctx.load_texture(
        format!("tile_{}_{}/{}", coord.zoom, coord.x, coord.y),
        color_image,
        TextureOptions::default(),
    ))
}

/// Delete cache entries last modified more than `max_age` ago.
fn cleanup_old_tiles(cache_dir: &Path, max_age: Duration) -> usize {
    let now = SystemTime::now();
    let Ok(entries) = fs::read_dir(cache_dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);
        if stale && fs::remove_file(entry.path()).is_ok() {
            debug!("Removed old tile cache: {}", entry.path().display());
            removed += 1;
        }
    }
    removed
}
