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

//! Sortable port table.

use egui::{Color32, RichText, Sense};
use egui_extras::{Column, TableBuilder};
use patrol_core::model::format_metric;
use patrol_core::table::{SortKey, SortState, TableView};
use patrol_core::ClassifiedPort;

const ROW_HEIGHT: f32 = 22.0;
const HEADER_HEIGHT: f32 = 24.0;

/// A row the user clicked: coordinate and name of the port.
#[derive(Debug, Clone, PartialEq)]
pub struct RowClick {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct TableResponse {
    pub header_clicked: Option<SortKey>,
    pub row_clicked: Option<RowClick>,
}

/// Column header text with the sort indicator.
#[must_use]
pub fn header_label(title: &str, key: SortKey, sort: SortState) -> String {
    format!("{title} {}", sort.indicator(key))
}

#[derive(Debug, Default)]
pub struct TablePanel {
    total: usize,
    visible: Vec<ClassifiedPort>,
    sort: SortState,
}

impl TableView for TablePanel {
    fn set_rows(&mut self, rows: &[ClassifiedPort]) {
        self.total = rows.len();
    }

    fn render(&mut self, visible: &[&ClassifiedPort], sort: SortState) {
        self.visible = visible.iter().map(|row| (*row).clone()).collect();
        self.sort = sort;
    }
}

impl TablePanel {
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn show(&self, ui: &mut egui::Ui) -> TableResponse {
        let mut out = TableResponse::default();

        TableBuilder::new(ui)
            .striped(true)
            .sense(Sense::click())
            .column(Column::remainder().at_least(140.0).clip(true))
            .column(Column::exact(72.0))
            .column(Column::exact(64.0))
            .header(HEADER_HEIGHT, |mut header| {
                for (title, key) in [("Port", SortKey::Name), ("Weight", SortKey::Weight), ("Units", SortKey::Count)] {
                    header.col(|ui| {
                        if ui
                            .add(egui::Button::new(RichText::new(header_label(title, key, self.sort)).strong()).frame(false))
                            .clicked()
                        {
                            out.header_clicked = Some(key);
                        }
                    });
                }
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, self.visible.len(), |mut row| {
                    let Some(item) = self.visible.get(row.index()) else {
                        return;
                    };
                    let port = &item.port;
                    row.col(|ui| {
                        let dot = item.status.map_or(Color32::from_gray(170), |s| {
                            let (r, g, b) = s.color();
                            Color32::from_rgb(r, g, b)
                        });
                        ui.label(RichText::new("●").color(dot));
                        ui.label(&port.name);
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(format_metric(port.weight)).monospace());
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(format_metric(port.count)).monospace());
                    });
                    if row.response().clicked() {
                        out.row_clicked = Some(RowClick {
                            lat: port.lat,
                            lng: port.lng,
                            name: port.name.clone(),
                        });
                    }
                });
            });

        out
    }
}

#[cfg(test)]
mod tests {
    use patrol_core::model::PortRecord;
    use patrol_core::table::TableModel;

    use super::*;

    #[test]
    fn test_header_labels() {
        let sort = SortState::default();
        assert_eq!(header_label("Weight", SortKey::Weight, sort), "Weight ↓");
        assert_eq!(header_label("Port", SortKey::Name, sort), "Port ⇅");
    }

    #[test]
    fn test_render_keeps_display_order() {
        let rows: Vec<ClassifiedPort> = [("Gion", 1.0), ("Shijo", 12.0)]
            .into_iter()
            .map(|(n, w)| ClassifiedPort::new(PortRecord::new(n, 35.0, 135.7, w, 0.0)))
            .collect();
        let mut model = TableModel::default();
        model.set_data(&rows);

        let mut panel = TablePanel::default();
        panel.set_rows(&rows);
        panel.render(&model.visible_rows("i"), model.sort());

        assert_eq!(panel.total(), 2);
        assert_eq!(panel.visible_count(), 2);
        assert_eq!(panel.visible[0].port.name, "Shijo");
    }
}
