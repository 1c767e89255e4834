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

//! Jawg Maps "Sunny" basemap.

use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

/// Tile source for the Jawg Sunny style. Needs an access token.
pub struct JawgSunnySource {
    access_token: String,
}

impl std::fmt::Debug for JawgSunnySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JawgSunnySource").finish_non_exhaustive()
    }
}

impl JawgSunnySource {
    #[must_use]
    pub fn new(access_token: String) -> Self {
        Self { access_token }
    }
}

impl TileSource for JawgSunnySource {
    fn tile_url(&self, tile_id: TileId) -> String {
        format!(
            "https://tile.jawg.io/jawg-sunny/{}/{}/{}.png?access-token={}",
            tile_id.zoom, tile_id.x, tile_id.y, self.access_token
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© Jawg Maps © OpenStreetMap contributors",
            url: "https://www.jawg.io",
            logo_light: None,
            logo_dark: None,
        }
    }

    fn max_zoom(&self) -> u8 {
        22
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_carries_token() {
        let source = JawgSunnySource::new("abc".to_string());
        assert_eq!(
            source.tile_url(TileId { x: 7, y: 3, zoom: 13 }),
            "https://tile.jawg.io/jawg-sunny/13/7/3.png?access-token=abc"
        );
        assert!(!format!("{source:?}").contains("abc"));
    }
}
