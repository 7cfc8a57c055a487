//! Local atlas cache client.
//!
//! The cache directory mirrors the layout of the atlas release bucket and
//! carries a `manifest.json` describing every file:
//!
//! ```json
//! {
//!   "version": "20240330",
//!   "file_listing": {
//!     "Zhuang-ABCA-1": {
//!       "metadata": {
//!         "cell_metadata": { "files": { "csv": { "relative_path": "metadata/Zhuang-ABCA-1/cell_metadata.csv", "size": 1234 } } }
//!       },
//!       "expression_matrices": {
//!         "Zhuang-ABCA-1/log2": { "files": { "parquet": { "relative_path": "expression_matrices/Zhuang-ABCA-1/log2.parquet" } } }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Nothing is downloaded: files must already be present.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::loader::{self, ReadOptions};
use crate::data::model::Table;

pub const MANIFEST_FILE: &str = "manifest.json";

const METADATA_KIND: &str = "csv";
const MATRIX_KIND: &str = "parquet";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no manifest.json in cache directory {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("directory '{0}' is not listed in the manifest")]
    UnknownDirectory(String),

    #[error("'{file_name}' is not listed under '{directory}'")]
    UnknownFile { directory: String, file_name: String },

    #[error("'{file_name}' in '{directory}' has no {kind} file")]
    MissingKind {
        directory: String,
        file_name: String,
        kind: &'static str,
    },

    #[error("{} is listed in the manifest but not present in the cache", .0.display())]
    NotCached(PathBuf),

    #[error("{} is {actual} bytes, manifest says {expected}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

// ---------------------------------------------------------------------------
// Manifest schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub file_listing: BTreeMap<String, DirectoryListing>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub metadata: BTreeMap<String, FileEntry>,
    #[serde(default)]
    pub expression_matrices: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileEntry {
    pub files: BTreeMap<String, FileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

// ---------------------------------------------------------------------------
// Cache client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AbcCache {
    root: PathBuf,
    manifest: Manifest,
}

impl AbcCache {
    /// Open a cache rooted at `dir`, reading its manifest.
    pub fn from_cache_dir(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(CacheError::ManifestMissing(dir.to_path_buf()).into());
        }
        let text = std::fs::read_to_string(&manifest_path).context("reading manifest")?;
        let manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", manifest_path.display()))?;
        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
        })
    }

    /// Version label of the loaded manifest.
    pub fn current_manifest(&self) -> &str {
        &self.manifest.version
    }

    pub fn list_directories(&self) -> Vec<&str> {
        self.manifest.file_listing.keys().map(String::as_str).collect()
    }

    pub fn list_metadata_files(&self, directory: &str) -> Result<Vec<&str>> {
        Ok(self
            .listing(directory)?
            .metadata
            .keys()
            .map(String::as_str)
            .collect())
    }

    /// Read a metadata table. The result is positionally indexed; callers
    /// pick their key with [`Table::set_index`].
    pub fn get_metadata_table(
        &self,
        directory: &str,
        file_name: &str,
        options: &ReadOptions,
    ) -> Result<Table> {
        let entry = self
            .listing(directory)?
            .metadata
            .get(file_name)
            .ok_or_else(|| CacheError::UnknownFile {
                directory: directory.to_string(),
                file_name: file_name.to_string(),
            })?;
        let path = self.resolve(directory, file_name, entry, METADATA_KIND)?;
        log::debug!("reading {directory}/{file_name} from {}", path.display());
        loader::read_csv(&path, options)
    }

    /// Local path of a data file (an expression matrix).
    pub fn get_data_path(&self, directory: &str, file_name: &str) -> Result<PathBuf> {
        let entry = self
            .listing(directory)?
            .expression_matrices
            .get(file_name)
            .ok_or_else(|| CacheError::UnknownFile {
                directory: directory.to_string(),
                file_name: file_name.to_string(),
            })?;
        self.resolve(directory, file_name, entry, MATRIX_KIND)
    }

    fn listing(&self, directory: &str) -> Result<&DirectoryListing, CacheError> {
        self.manifest
            .file_listing
            .get(directory)
            .ok_or_else(|| CacheError::UnknownDirectory(directory.to_string()))
    }

    fn resolve(
        &self,
        directory: &str,
        file_name: &str,
        entry: &FileEntry,
        kind: &'static str,
    ) -> Result<PathBuf> {
        let record = entry.files.get(kind).ok_or_else(|| CacheError::MissingKind {
            directory: directory.to_string(),
            file_name: file_name.to_string(),
            kind,
        })?;
        let path = self.root.join(&record.relative_path);
        let meta = std::fs::metadata(&path).map_err(|_| CacheError::NotCached(path.clone()))?;
        if let Some(expected) = record.size {
            if meta.len() != expected {
                return Err(CacheError::SizeMismatch {
                    path,
                    expected,
                    actual: meta.len(),
                }
                .into());
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Value;

    fn record(path: &str, size: Option<u64>) -> FileEntry {
        FileEntry {
            files: [(
                METADATA_KIND.to_string(),
                FileRecord {
                    relative_path: path.to_string(),
                    size,
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    fn write_cache(dir: &Path, size: Option<u64>) {
        let rel = "metadata/WMB-taxonomy/cluster.csv";
        std::fs::create_dir_all(dir.join("metadata/WMB-taxonomy")).unwrap();
        std::fs::write(dir.join(rel), "cluster_alias,neurotransmitter\n1,Glut\n2,\n").unwrap();

        let mut listing = DirectoryListing::default();
        listing.metadata.insert("cluster".into(), record(rel, size));
        listing
            .metadata
            .insert("absent".into(), record("metadata/WMB-taxonomy/absent.csv", None));
        let manifest = Manifest {
            version: "test-1".into(),
            file_listing: [("WMB-taxonomy".to_string(), listing)].into_iter().collect(),
        };
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn reads_listed_metadata_with_options() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), None);
        let cache = AbcCache::from_cache_dir(dir.path()).unwrap();
        assert_eq!(cache.current_manifest(), "test-1");
        assert_eq!(cache.list_directories(), ["WMB-taxonomy"]);
        assert_eq!(
            cache.list_metadata_files("WMB-taxonomy").unwrap(),
            ["absent", "cluster"]
        );

        let opts = ReadOptions::default().keep_default_na(false);
        let t = cache.get_metadata_table("WMB-taxonomy", "cluster", &opts).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1, "neurotransmitter"), Some(&Value::from("")));
    }

    #[test]
    fn unknown_names_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), None);
        let cache = AbcCache::from_cache_dir(dir.path()).unwrap();
        let opts = ReadOptions::default();

        let err = cache.get_metadata_table("Nope", "cluster", &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::UnknownDirectory(_))
        ));
        let err = cache.get_metadata_table("WMB-taxonomy", "nope", &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::UnknownFile { .. })
        ));
        let err = cache.get_metadata_table("WMB-taxonomy", "absent", &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::NotCached(_))
        ));
        let err = cache.get_data_path("WMB-taxonomy", "cluster").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::UnknownFile { .. })
        ));
    }

    #[test]
    fn declared_size_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), Some(1));
        let cache = AbcCache::from_cache_dir(dir.path()).unwrap();
        let err = cache
            .get_metadata_table("WMB-taxonomy", "cluster", &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::SizeMismatch { expected: 1, .. })
        ));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = AbcCache::from_cache_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::ManifestMissing(_))
        ));
    }
}
