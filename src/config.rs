use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::data::filter::PopulationFilter;

/// Screened genes of interest for accessory olfactory bulb mitral cells.
pub const DEFAULT_GENES: &[&str] = &[
    "Slc17a6", "Slc32a1", "Gnrh1", "Esr1", "Esr2", "Npy1", "Npy2", "Cyp19a1", "Tac2", "Crhr1",
    "Crhr2",
];

pub const DEFAULT_DATASETS: &[&str] = &["Zhuang-ABCA-1", "Zhuang-ABCA-2", "Zhuang-ABCA-3"];

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Everything a pipeline run needs, resolved once at process entry and
/// passed to each stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the local atlas cache (holds `manifest.json`).
    pub cache_dir: PathBuf,
    /// Datasets to process, in output order.
    pub datasets: Vec<String>,
    /// Parcellation structure acronym to keep.
    pub structure_mask: String,
    /// Neurotransmitter class to keep.
    pub nt_mask: String,
    /// Gene symbols whose expression is joined onto the population.
    pub genes: Vec<String>,
    /// Directory whose `gene` table is used. Defaults to the first dataset.
    pub gene_directory: Option<String>,
    /// Name of the column recording each row's dataset in the combined
    /// table. `null` leaves dataset identity out.
    pub dataset_column: Option<String>,
    /// Brain section shown per dataset in the sections view.
    pub example_sections: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("abc_atlas"),
            datasets: DEFAULT_DATASETS.iter().map(|s| s.to_string()).collect(),
            structure_mask: "AOB".to_string(),
            nt_mask: "Glut".to_string(),
            genes: DEFAULT_GENES.iter().map(|s| s.to_string()).collect(),
            gene_directory: None,
            dataset_column: Some("dataset".to_string()),
            example_sections: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Omitted fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn population(&self) -> PopulationFilter {
        PopulationFilter::new(&self.structure_mask, &self.nt_mask)
    }

    pub fn gene_directory(&self) -> Result<&str> {
        match (&self.gene_directory, self.datasets.first()) {
            (Some(dir), _) => Ok(dir.as_str()),
            (None, Some(first)) => Ok(first.as_str()),
            (None, None) => bail!("no datasets configured and no gene_directory given"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            bail!("at least one dataset is required");
        }
        if let Some(dup) = self
            .datasets
            .iter()
            .enumerate()
            .find(|(i, d)| self.datasets[..*i].contains(d))
            .map(|(_, d)| d)
        {
            bail!("dataset '{dup}' listed twice");
        }
        Ok(())
    }
}
