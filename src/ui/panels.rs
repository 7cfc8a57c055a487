use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::figure::{self, ColorBy};
use crate::state::{self, AppState, View};

// ---------------------------------------------------------------------------
// Left side panel – view options
// ---------------------------------------------------------------------------

/// Render the left options panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Population");
    ui.label(format!(
        "{} · {}",
        state.config.structure_mask, state.config.nt_mask
    ));
    ui.separator();

    let Some(output) = &state.output else {
        ui.label("No pipeline output.");
        return;
    };

    // Clone what we need so we can mutate state inside the loop.
    let color_columns = state::color_columns(output);
    let genes = output.gene_symbols.clone();
    let section_choices: Vec<(String, Vec<String>)> = output
        .datasets
        .iter()
        .map(|ds| (ds.dataset.clone(), figure::section_labels(&ds.table)))
        .collect();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            // ---- Colour-by selector ----
            ui.strong("Color by");
            let current = state
                .color_by
                .as_ref()
                .map(|c| c.column().to_string())
                .unwrap_or_default();
            egui::ComboBox::from_id_salt("color_by")
                .selected_text(&current)
                .show_ui(ui, |ui: &mut Ui| {
                    for col in &color_columns {
                        let choice = ColorBy::Category(col.clone());
                        let selected = state.color_by.as_ref() == Some(&choice);
                        if ui.selectable_label(selected, col).clicked() {
                            state.color_by = Some(choice);
                        }
                    }
                    ui.separator();
                    for gene in &genes {
                        let choice = ColorBy::Scalar(gene.clone());
                        let selected = state.color_by.as_ref() == Some(&choice);
                        let label = RichText::new(gene).italics();
                        if ui.selectable_label(selected, label).clicked() {
                            state.color_by = Some(choice);
                        }
                    }
                });

            // ---- Colour range ----
            let mut clamp = state.vmax.is_some();
            if ui.checkbox(&mut clamp, "Clamp colour range").changed() {
                state.vmax = clamp.then_some(1.0);
            }
            if let Some(vmax) = &mut state.vmax {
                ui.add(egui::Slider::new(vmax, 0.0..=15.0).text("vmax"));
            }
            ui.separator();

            // ---- Per-dataset section selectors (collapsible) ----
            ui.strong("Sections");
            for (dataset, labels) in &section_choices {
                let current = state.sections.get(dataset).cloned().flatten();
                let header_text = format!("{dataset}  ({} sections)", labels.len());

                egui::CollapsingHeader::new(RichText::new(header_text).strong())
                    .id_salt(dataset)
                    .default_open(false)
                    .show(ui, |ui: &mut Ui| {
                        if ui.radio(current.is_none(), "All sections").clicked() {
                            state.set_section(dataset, None);
                        }
                        for label in labels {
                            let checked = current.as_deref() == Some(label.as_str());
                            if ui.radio(checked, label).clicked() {
                                state.set_section(dataset, Some(label.clone()));
                            }
                        }
                    });
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open config…").clicked() {
                open_config_dialog(state);
                ui.close_menu();
            }
            if ui.button("Rerun pipeline").clicked() {
                state.rerun();
                ui.close_menu();
            }
            if ui
                .add_enabled(state.output.is_some(), egui::Button::new("Export…"))
                .clicked()
            {
                export_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        ui.selectable_value(&mut state.view, View::Sections, "Sections");
        ui.selectable_value(&mut state.view, View::Heatmap, "Heatmap");
        ui.selectable_value(&mut state.view, View::Table, "Table");

        ui.separator();

        if let Some(output) = &state.output {
            ui.label(format!(
                "{} cells across {} datasets",
                output.combined.len(),
                output.datasets.len()
            ));
        }

        if let Some(msg) = &state.status_message {
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                ui.visuals().text_color()
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_config_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open pipeline config")
        .add_filter("JSON", &["json"])
        .pick_file();

    if let Some(path) = file {
        state.open_config(&path);
    }
}

pub fn export_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export combined table")
        .add_filter("CSV", &["csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .set_file_name("combined.csv")
        .save_file();

    if let Some(path) = file {
        if let Err(e) = state.export(&path) {
            log::error!("Failed to export: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
