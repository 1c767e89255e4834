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

use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

/// Carto CDN light basemap, used when no Jawg token is configured.
/// Requests are spread across the a-d subdomains.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartoLightSource;

impl TileSource for CartoLightSource {
    fn tile_url(&self, tile_id: TileId) -> String {
        let subdomain = ['a', 'b', 'c', 'd'][((tile_id.x + tile_id.y) % 4) as usize];

        format!(
            "https://{}.basemaps.cartocdn.com/light_all/{}/{}/{}.png",
            subdomain, tile_id.zoom, tile_id.x, tile_id.y
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© OpenStreetMap contributors, © CARTO",
            url: "https://carto.com/attributions",
            logo_light: None,
            logo_dark: None,
        }
    }

    fn max_zoom(&self) -> u8 {
        20
    }
}
