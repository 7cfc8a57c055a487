use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::PipelineConfig;

#[derive(Debug, Parser)]
#[command(
    name = "abc-explorer",
    version,
    about = "Explore spatial transcriptomics of a cell population in the Allen Brain Cell atlas"
)]
pub struct Args {
    /// Pipeline configuration (JSON). Defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root of the local atlas cache (holds manifest.json)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Dataset to process, repeatable; replaces the configured list
    #[arg(short = 'd', long = "dataset", value_name = "NAME", action = clap::ArgAction::Append)]
    pub datasets: Vec<String>,

    /// Parcellation structure acronym to keep (exact match)
    #[arg(long, value_name = "ACRONYM")]
    pub structure: Option<String>,

    /// Neurotransmitter class to keep (exact match)
    #[arg(long, value_name = "CLASS")]
    pub nt: Option<String>,

    /// Gene symbol to join, repeatable; replaces the configured list
    #[arg(short = 'g', long = "gene", value_name = "SYMBOL", action = clap::ArgAction::Append)]
    pub genes: Vec<String>,

    /// Write the combined table here (.csv or .parquet)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print a preview instead of opening the viewer
    #[arg(long)]
    pub headless: bool,

    /// Rows shown by the headless preview
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub preview_rows: usize,
}

impl Args {
    /// The config file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if !self.datasets.is_empty() {
            config.datasets = self.datasets.clone();
        }
        if let Some(s) = &self.structure {
            config.structure_mask = s.clone();
        }
        if let Some(nt) = &self.nt {
            config.nt_mask = nt.clone();
        }
        if !self.genes.is_empty() {
            config.genes = self.genes.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "abc-explorer",
            "--cache-dir",
            "/data/abc",
            "-d",
            "Zhuang-ABCA-4",
            "--structure",
            "MOB",
            "-g",
            "Gnrh1",
            "-g",
            "Esr1",
            "--headless",
        ])
        .unwrap();
        let cfg = args.resolve_config().unwrap();
        assert_eq!(cfg.cache_dir, PathBuf::from("/data/abc"));
        assert_eq!(cfg.datasets, ["Zhuang-ABCA-4"]);
        assert_eq!(cfg.structure_mask, "MOB");
        assert_eq!(cfg.nt_mask, "Glut");
        assert_eq!(cfg.genes, ["Gnrh1", "Esr1"]);
        assert!(args.headless);
    }

    #[test]
    fn config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "nt_mask": "GABA", "structure_mask": "MOB" }"#).unwrap();

        let args = Args::try_parse_from([
            "abc-explorer",
            "--config",
            path.to_str().unwrap(),
            "--nt",
            "Dopa",
        ])
        .unwrap();
        let cfg = args.resolve_config().unwrap();
        assert_eq!(cfg.structure_mask, "MOB");
        assert_eq!(cfg.nt_mask, "Dopa");
    }
}
