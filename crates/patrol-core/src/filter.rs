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

//! Map visibility filter for the watch buckets.
//!
//! Urgent ports are always shown. The yellow and green buckets each have a
//! checkbox; once the user has touched a checkbox it is never changed
//! automatically again for the rest of the session.

use crate::status::PortStatus;

/// Which watch buckets are drawn on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewFilter {
    pub show_yellow: bool,
    pub show_green: bool,
}

impl Default for ViewFilter {
    /// Yellow on, green off: green ports need no patrol.
    fn default() -> Self {
        Self {
            show_yellow: true,
            show_green: false,
        }
    }
}

impl ViewFilter {
    /// Whether a port with this status passes the filter.
    #[must_use]
    pub fn allows(&self, status: PortStatus) -> bool {
        match status {
            PortStatus::Urgent => true,
            PortStatus::WatchYellow => self.show_yellow,
            PortStatus::WatchGreen => self.show_green,
        }
    }
}

/// Filter checkboxes plus the per-checkbox "user touched" latch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    filter: ViewFilter,
    yellow_touched: bool,
    green_touched: bool,
}

impl FilterState {
    #[must_use]
    pub fn new(filter: ViewFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(&self) -> ViewFilter {
        self.filter
    }

    /// User toggled the yellow checkbox.
    pub fn set_yellow(&mut self, show: bool) {
        self.yellow_touched = true;
        self.filter.show_yellow = show;
    }

    /// User toggled the green checkbox.
    pub fn set_green(&mut self, show: bool) {
        self.green_touched = true;
        self.filter.show_green = show;
    }

    #[must_use]
    pub fn yellow_touched(&self) -> bool {
        self.yellow_touched
    }

    #[must_use]
    pub fn green_touched(&self) -> bool {
        self.green_touched
    }

    /// Turn untouched watch checkboxes off when the urgent backlog is large.
    ///
    /// Never turns anything back on. Returns true if the filter changed.
    pub fn apply_auto_default(&mut self, urgent_count: usize, threshold: usize) -> bool {
        if urgent_count < threshold {
            return false;
        }
        let before = self.filter;
        if !self.yellow_touched {
            self.filter.show_yellow = false;
        }
        if !self.green_touched {
            self.filter.show_green = false;
        }
        before != self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> FilterState {
        FilterState::new(ViewFilter {
            show_yellow: true,
            show_green: true,
        })
    }

    #[test]
    fn test_urgent_always_allowed() {
        let filter = ViewFilter {
            show_yellow: false,
            show_green: false,
        };
        assert!(filter.allows(PortStatus::Urgent));
        assert!(!filter.allows(PortStatus::WatchYellow));
        assert!(!filter.allows(PortStatus::WatchGreen));
    }

    #[test]
    fn test_threshold_crossing_turns_filters_off() {
        let mut state = all_on();
        assert!(!state.apply_auto_default(39, 40));
        assert!(state.filter().show_yellow);

        assert!(state.apply_auto_default(40, 40));
        assert!(!state.filter().show_yellow);
        assert!(!state.filter().show_green);

        // Dropping below the threshold does not restore them.
        assert!(!state.apply_auto_default(39, 40));
        assert!(!state.filter().show_yellow);
        assert!(!state.filter().show_green);
    }

    #[test]
    fn test_touched_checkbox_is_left_alone() {
        let mut state = all_on();
        state.set_yellow(true);

        state.apply_auto_default(120, 40);
        assert!(state.filter().show_yellow);
        assert!(!state.filter().show_green);
        assert!(state.yellow_touched());
        assert!(!state.green_touched());
    }
}
