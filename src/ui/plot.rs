use eframe::egui::{self, Align2, Color32, FontId, Rect, ScrollArea, Sense, Ui, pos2, vec2};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Plot, PlotPoints, Points};

use crate::figure::{self, ColorBy};
use crate::state::AppState;

/// Cell size of the heatmap in points.
const HEATMAP_CELL: egui::Vec2 = egui::Vec2::new(48.0, 6.0);

fn no_data(ui: &mut Ui) {
    ui.centered_and_justified(|ui: &mut Ui| {
        ui.heading("No pipeline output  (File → Open config…)");
    });
}

// ---------------------------------------------------------------------------
// Sections view: one scatter per dataset
// ---------------------------------------------------------------------------

/// Render every dataset's cells at their section coordinates, side by side.
pub fn sections_view(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        no_data(ui);
        return;
    };
    let Some(color_by) = &state.color_by else {
        ui.label("Pick a colour column.");
        return;
    };

    let n = output.datasets.len().max(1);
    ui.columns(n, |columns: &mut [Ui]| {
        for (ui, ds) in columns.iter_mut().zip(&output.datasets) {
            let section = state.sections.get(&ds.dataset).cloned().flatten();
            let scatter =
                match figure::section_scatter(ds, section.as_deref(), color_by, state.vmax) {
                    Ok(s) => s,
                    Err(e) => {
                        ui.colored_label(Color32::RED, format!("{}: {e:#}", ds.dataset));
                        continue;
                    }
                };

            ui.vertical_centered(|ui: &mut Ui| {
                ui.strong(&scatter.title);
                ui.label(format!("{} cells", scatter.n_points()));
            });

            let mut plot = Plot::new(format!("section_{}", ds.dataset))
                .data_aspect(1.0)
                .show_axes(false)
                .show_grid(false)
                .include_x(0.0)
                .include_x(11.0)
                .include_y(0.0)
                .include_y(-11.0)
                .allow_boxed_zoom(true)
                .allow_drag(true)
                .allow_scroll(true)
                .allow_zoom(true);
            if matches!(color_by, ColorBy::Category(_)) {
                plot = plot.legend(Legend::default());
            }

            plot.show(ui, |plot_ui| {
                for group in &scatter.groups {
                    // Section images put y downwards.
                    let points: PlotPoints = group.points.iter().map(|&[x, y]| [x, -y]).collect();
                    let mut series = Points::new(points).color(group.color).radius(2.0);
                    if !group.label.is_empty() {
                        series = series.name(&group.label);
                    }
                    plot_ui.points(series);
                }
            });
        }
    });
}

// ---------------------------------------------------------------------------
// Heatmap view: cells × genes
// ---------------------------------------------------------------------------

pub fn heatmap_view(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        no_data(ui);
        return;
    };
    if output.gene_symbols.is_empty() {
        ui.label("No genes were joined.");
        return;
    }
    let heatmap = match figure::heatmap(&output.combined, &output.gene_symbols, state.vmax) {
        Ok(h) => h,
        Err(e) => {
            ui.colored_label(Color32::RED, format!("{e:#}"));
            return;
        }
    };

    ui.label(format!(
        "{} cells × {} genes, colour range {:.2} – {:.2}",
        heatmap.row_labels.len(),
        heatmap.column_labels.len(),
        heatmap.color_map.vmin,
        heatmap.color_map.vmax
    ));

    ScrollArea::both().auto_shrink([false, false]).show(ui, |ui: &mut Ui| {
        let label_height = 16.0;
        let size = vec2(
            HEATMAP_CELL.x * heatmap.column_labels.len() as f32,
            label_height + HEATMAP_CELL.y * heatmap.row_labels.len() as f32,
        );
        let (rect, response) = ui.allocate_exact_size(size, Sense::hover());
        let painter = ui.painter_at(rect);
        let text_color = ui.visuals().text_color();

        for (j, label) in heatmap.column_labels.iter().enumerate() {
            let x = rect.min.x + HEATMAP_CELL.x * (j as f32 + 0.5);
            painter.text(
                pos2(x, rect.min.y),
                Align2::CENTER_TOP,
                label,
                FontId::proportional(11.0),
                text_color,
            );
        }

        let origin = rect.min + vec2(0.0, label_height);
        for (i, row) in heatmap.values.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                let min = origin + vec2(HEATMAP_CELL.x * j as f32, HEATMAP_CELL.y * i as f32);
                let cell = Rect::from_min_size(min, HEATMAP_CELL);
                painter.rect_filled(cell, 0.0, heatmap.color_map.color_for(v));
            }
        }

        // Tooltip for the hovered cell.
        let hovered = response.hover_pos().and_then(|p| {
            let rel = p - origin;
            if rel.y < 0.0 {
                return None;
            }
            let i = (rel.y / HEATMAP_CELL.y) as usize;
            let j = (rel.x / HEATMAP_CELL.x) as usize;
            let v = heatmap.values.get(i)?.get(j)?;
            Some(format!(
                "{}  {}: {v:.3}",
                heatmap.row_labels[i], heatmap.column_labels[j]
            ))
        });
        if let Some(text) = hovered {
            response.on_hover_text_at_pointer(text);
        }
    });
}

// ---------------------------------------------------------------------------
// Table view: the combined table
// ---------------------------------------------------------------------------

pub fn table_view(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        no_data(ui);
        return;
    };
    let table = &output.combined;
    let index_name = table.index_name().unwrap_or("index");

    ScrollArea::horizontal().show(ui, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(Column::auto().at_least(80.0))
            .columns(Column::auto().at_least(60.0), table.columns().len())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong(index_name);
                });
                for name in table.columns() {
                    header.col(|ui| {
                        ui.strong(name);
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, table.len(), |mut row| {
                    let i = row.index();
                    row.col(|ui| {
                        ui.label(table.index()[i].to_string());
                    });
                    for value in &table.rows()[i] {
                        row.col(|ui| {
                            ui.label(value.to_string());
                        });
                    }
                });
            });
    });
}
