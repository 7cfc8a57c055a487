use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::config::PipelineConfig;
use crate::data::loader;
use crate::figure::{self, ColorBy};
use crate::pipeline::{self, PipelineOutput};

/// Colour column picked when a run first loads, if present.
const DEFAULT_COLOR_COLUMN: &str = "subclass_color";

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Sections,
    Heatmap,
    Table,
}

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Configuration the current output was produced with.
    pub config: PipelineConfig,

    /// Result of the last pipeline run.
    pub output: Option<PipelineOutput>,

    pub view: View,

    /// How section scatters are coloured.
    pub color_by: Option<ColorBy>,

    /// Section shown per dataset; `None` shows every section.
    pub sections: BTreeMap<String, Option<String>>,

    /// Upper bound of the colour ramp; `None` fits the data.
    pub vmax: Option<f64>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            output: None,
            view: View::Sections,
            color_by: None,
            sections: BTreeMap::new(),
            vmax: None,
            status_message: None,
        }
    }

    /// Ingest a pipeline result, initialise section choices and colour.
    pub fn set_output(&mut self, output: PipelineOutput) {
        self.sections = output
            .datasets
            .iter()
            .map(|ds| {
                let wanted = self
                    .config
                    .example_sections
                    .get(&ds.dataset)
                    .filter(|s| figure::section_labels(&ds.table).contains(s))
                    .cloned();
                (ds.dataset.clone(), wanted)
            })
            .collect();

        let color_columns = color_columns(&output);
        self.color_by = color_columns
            .iter()
            .find(|c| c.as_str() == DEFAULT_COLOR_COLUMN)
            .or_else(|| color_columns.first())
            .map(|c| ColorBy::Category(c.clone()))
            .or_else(|| output.gene_symbols.first().map(|g| ColorBy::Scalar(g.clone())));

        self.output = Some(output);
        self.status_message = None;
    }

    /// Run the pipeline for the current configuration.
    pub fn rerun(&mut self) {
        match pipeline::run(&self.config) {
            Ok(output) => self.set_output(output),
            Err(e) => {
                log::error!("Pipeline failed: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Replace the configuration from a file and rerun.
    pub fn open_config(&mut self, path: &Path) {
        match PipelineConfig::load(path) {
            Ok(config) => {
                self.config = config;
                self.rerun();
            }
            Err(e) => {
                log::error!("Failed to load config: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    pub fn export(&mut self, path: &Path) -> Result<()> {
        let Some(output) = &self.output else {
            anyhow::bail!("nothing to export");
        };
        loader::write_table(&output.combined, path)?;
        log::info!("Exported {} rows to {}", output.combined.len(), path.display());
        self.status_message = Some(format!("Exported to {}", path.display()));
        Ok(())
    }

    pub fn set_section(&mut self, dataset: &str, section: Option<String>) {
        self.sections.insert(dataset.to_string(), section);
    }
}

/// Hex colour columns available for categorical colouring.
pub fn color_columns(output: &PipelineOutput) -> Vec<String> {
    output
        .datasets
        .first()
        .map(|ds| {
            ds.table
                .columns()
                .iter()
                .filter(|c| c.ends_with("_color"))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            cache_dir: dir.to_path_buf(),
            datasets: vec!["Zhuang-ABCA-1".into(), "Zhuang-ABCA-2".into()],
            genes: vec!["Slc17a6".into(), "Gnrh1".into()],
            example_sections: [
                ("Zhuang-ABCA-1".to_string(), "S1".to_string()),
                ("Zhuang-ABCA-2".to_string(), "absent".to_string()),
            ]
            .into_iter()
            .collect(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn rerun_initialises_view_choices() {
        let dir = testutil::sample_cache();
        let mut state = AppState::new(config(dir.path()));
        state.rerun();

        assert!(state.status_message.is_none());
        assert!(state.output.is_some());
        assert_eq!(
            state.color_by,
            Some(ColorBy::Category(DEFAULT_COLOR_COLUMN.into()))
        );
        assert_eq!(state.sections["Zhuang-ABCA-1"], Some("S1".to_string()));
        // Unknown example sections fall back to all sections.
        assert_eq!(state.sections["Zhuang-ABCA-2"], None);
    }

    #[test]
    fn failed_run_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::new(config(dir.path()));
        state.rerun();
        assert!(state.output.is_none());
        assert!(state.status_message.unwrap().starts_with("Error"));
    }

    #[test]
    fn export_requires_output() {
        let dir = testutil::sample_cache();
        let mut state = AppState::new(config(dir.path()));
        let target = dir.path().join("combined.csv");
        assert!(state.export(&target).is_err());

        state.rerun();
        state.export(&target).unwrap();
        assert!(target.is_file());
    }
}
