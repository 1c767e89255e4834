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

//! Port table state: rows, sort order and name search.

use std::cmp::Ordering;

use crate::model::ClassifiedPort;

/// Sortable table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Name,
    Weight,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::Weight,
            direction: SortDirection::Desc,
        }
    }
}

impl SortState {
    /// Header indicator for a column: the arrow on the active column, a
    /// neutral glyph elsewhere.
    #[must_use]
    pub fn indicator(&self, key: SortKey) -> &'static str {
        if self.key != key {
            return "⇅";
        }
        match self.direction {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }

    /// State after clicking a column header.
    #[must_use]
    pub fn clicked(self, key: SortKey) -> Self {
        if self.key == key {
            Self {
                key,
                direction: self.direction.toggled(),
            }
        } else {
            Self {
                key,
                direction: SortDirection::Desc,
            }
        }
    }

    /// Compare two rows. Weight and count break ties on each other; names
    /// compare lexicographically.
    #[must_use]
    pub fn compare(&self, a: &ClassifiedPort, b: &ClassifiedPort) -> Ordering {
        let dir = self.direction;
        match self.key {
            SortKey::Weight => dir
                .apply(a.port.weight.total_cmp(&b.port.weight))
                .then_with(|| dir.apply(a.port.count.total_cmp(&b.port.count))),
            SortKey::Count => dir
                .apply(a.port.count.total_cmp(&b.port.count))
                .then_with(|| dir.apply(a.port.weight.total_cmp(&b.port.weight))),
            SortKey::Name => dir.apply(a.port.name.cmp(&b.port.name)),
        }
    }
}

/// Rendering side of the port table.
///
/// Row clicks are reported back to the controller by the implementation.
pub trait TableView {
    /// Replace the full row set.
    fn set_rows(&mut self, rows: &[ClassifiedPort]);

    /// Show the rows that survived search, in display order.
    fn render(&mut self, visible: &[&ClassifiedPort], sort: SortState);
}

/// Full row set plus sort state.
#[derive(Debug, Clone, Default)]
pub struct TableModel {
    rows: Vec<ClassifiedPort>,
    sort: SortState,
}

impl TableModel {
    /// Replace all rows and reset the sort to weight, descending.
    pub fn set_data(&mut self, rows: &[ClassifiedPort]) {
        self.rows = rows.to_vec();
        self.sort = SortState::default();
    }

    #[must_use]
    pub fn rows(&self) -> &[ClassifiedPort] {
        &self.rows
    }

    #[must_use]
    pub fn sort(&self) -> SortState {
        self.sort
    }

    /// Handle a header click.
    pub fn click_header(&mut self, key: SortKey) {
        self.sort = self.sort.clicked(key);
    }

    /// Rows whose name contains `query` (case-insensitive), sorted.
    #[must_use]
    pub fn visible_rows(&self, query: &str) -> Vec<&ClassifiedPort> {
        let needle = query.trim().to_lowercase();
        let mut rows: Vec<&ClassifiedPort> = self
            .rows
            .iter()
            .filter(|row| needle.is_empty() || row.port.name.to_lowercase().contains(&needle))
            .collect();
        rows.sort_by(|a, b| self.sort.compare(a, b));
        rows
    }
}
