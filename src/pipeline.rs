//! The exploration pipeline: build extended cell tables, filter to a
//! population, join gene expression, combine.
//!
//! ```text
//!   cell_metadata ─┐
//!   cluster details ┤ left joins
//!   cluster colors ─┤
//!   ccf_coordinates ┤ inner join (cells without CCF are dropped)
//!   parcellation ───┘ left joins
//!          │
//!          ▼
//!   PopulationFilter ──► ExpressionMatrix (requested genes only) ──► combine
//! ```
//!
//! Every stage takes and returns an ordered `Vec<DatasetTable>`; nothing is
//! shared between stages except the cache client and the configuration.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result, bail};

use crate::cache::AbcCache;
use crate::config::PipelineConfig;
use crate::data::expression::ExpressionMatrix;
use crate::data::filter::PopulationFilter;
use crate::data::loader::ReadOptions;
use crate::data::model::{JoinHow, Table, Value};

pub const TAXONOMY_DIRECTORY: &str = "WMB-taxonomy";
pub const PARCELLATION_DIRECTORY: &str = "Allen-CCF-2020";

pub const CLUSTER_DETAILS_FILE: &str = "cluster_to_cluster_annotation_membership_pivoted";
pub const CLUSTER_COLORS_FILE: &str = "cluster_to_cluster_annotation_membership_color";
pub const PARCELLATION_TERMS_FILE: &str = "parcellation_to_parcellation_term_membership_acronym";
pub const PARCELLATION_COLORS_FILE: &str = "parcellation_to_parcellation_term_membership_color";
pub const CELL_METADATA_FILE: &str = "cell_metadata";
pub const CCF_COORDINATES_FILE: &str = "ccf_coordinates";
pub const GENE_FILE: &str = "gene";

pub const CELL_KEY: &str = "cell_label";
pub const CLUSTER_KEY: &str = "cluster_alias";
pub const PARCELLATION_KEY: &str = "parcellation_index";
pub const SECTION_COLUMN: &str = "brain_section_label";
pub const GENE_KEY: &str = "gene_identifier";
pub const GENE_SYMBOL: &str = "gene_symbol";

const PARCELLATION_PREFIX: &str = "parcellation_";

/// One dataset's table, carried through the stages by value.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTable {
    pub dataset: String,
    pub table: Table,
}

/// CCF coordinate directory of a dataset.
pub fn ccf_directory(dataset: &str) -> String {
    format!("{dataset}-CCF")
}

/// Name of a dataset's log2 expression matrix in the cache.
pub fn log2_matrix_name(dataset: &str) -> String {
    format!("{dataset}/log2")
}

// ---------------------------------------------------------------------------
// Stage 1: extended cell tables
// ---------------------------------------------------------------------------

/// Join cell metadata, cluster annotation, CCF coordinates and parcellation
/// terms into one table per dataset, keyed by cell label.
pub fn create_cell_extended(cache: &AbcCache, datasets: &[String]) -> Result<Vec<DatasetTable>> {
    log::info!("Current manifest is: {}", cache.current_manifest());

    let cluster_details = cache
        .get_metadata_table(
            TAXONOMY_DIRECTORY,
            CLUSTER_DETAILS_FILE,
            &ReadOptions::default().keep_default_na(false),
        )?
        .set_index(CLUSTER_KEY)
        .context("indexing cluster details")?;
    let cluster_colors = cache
        .get_metadata_table(TAXONOMY_DIRECTORY, CLUSTER_COLORS_FILE, &ReadOptions::default())?
        .set_index(CLUSTER_KEY)
        .context("indexing cluster colors")?;

    let mut parcellation_terms = cache
        .get_metadata_table(
            PARCELLATION_DIRECTORY,
            PARCELLATION_TERMS_FILE,
            &ReadOptions::default(),
        )?
        .set_index(PARCELLATION_KEY)
        .context("indexing parcellation terms")?;
    parcellation_terms.prefix_columns(PARCELLATION_PREFIX);
    let mut parcellation_colors = cache
        .get_metadata_table(
            PARCELLATION_DIRECTORY,
            PARCELLATION_COLORS_FILE,
            &ReadOptions::default(),
        )?
        .set_index(PARCELLATION_KEY)
        .context("indexing parcellation colors")?;
    parcellation_colors.prefix_columns(PARCELLATION_PREFIX);

    let cell_options = ReadOptions::default().string_column(CELL_KEY);
    let mut extended = Vec::with_capacity(datasets.len());

    for dataset in datasets {
        let files = cache.list_metadata_files(dataset)?;
        log::debug!("{dataset}: metadata files {files:?}");
        let cells = cache
            .get_metadata_table(dataset, CELL_METADATA_FILE, &cell_options)?
            .set_index(CELL_KEY)
            .with_context(|| format!("indexing cell metadata of {dataset}"))?;
        let n_sections = cells
            .n_unique(SECTION_COLUMN)
            .with_context(|| format!("counting sections of {dataset}"))?;
        log::info!(
            "{dataset}: Number of cells = {}, Number of sections = {n_sections}",
            cells.len()
        );

        let mut ccf = cache
            .get_metadata_table(&ccf_directory(dataset), CCF_COORDINATES_FILE, &cell_options)?
            .set_index(CELL_KEY)
            .with_context(|| format!("indexing CCF coordinates of {dataset}"))?;
        ccf.rename_columns(&[("x", "x_ccf"), ("y", "y_ccf"), ("z", "z_ccf")]);

        let table = join_extended(
            &cells,
            &cluster_details,
            &cluster_colors,
            &ccf,
            &parcellation_terms,
            &parcellation_colors,
        )
        .with_context(|| format!("building extended table of {dataset}"))?;

        extended.push(DatasetTable {
            dataset: dataset.clone(),
            table,
        });
    }
    Ok(extended)
}

fn join_extended(
    cells: &Table,
    cluster_details: &Table,
    cluster_colors: &Table,
    ccf: &Table,
    parcellation_terms: &Table,
    parcellation_colors: &Table,
) -> Result<Table> {
    let table = cells
        .join(cluster_details, Some(CLUSTER_KEY), JoinHow::Left)?
        .join(cluster_colors, Some(CLUSTER_KEY), JoinHow::Left)?
        .join(ccf, None, JoinHow::Inner)?
        .join(parcellation_terms, Some(PARCELLATION_KEY), JoinHow::Left)?
        .join(parcellation_colors, Some(PARCELLATION_KEY), JoinHow::Left)?;
    Ok(table)
}

// ---------------------------------------------------------------------------
// Stage 2: population filter
// ---------------------------------------------------------------------------

pub fn filter_cell_extended(
    tables: Vec<DatasetTable>,
    filter: &PopulationFilter,
) -> Result<Vec<DatasetTable>> {
    tables
        .into_iter()
        .map(|DatasetTable { dataset, table }| {
            let table = filter
                .apply(&table)
                .with_context(|| format!("filtering {dataset}"))?;
            if table.is_empty() {
                log::warn!("{dataset}: no cells left after filtering");
            } else {
                log::info!(
                    "{dataset}: {} {}-ergic neurons within {}",
                    table.len(),
                    filter.neurotransmitter,
                    filter.structure
                );
            }
            Ok(DatasetTable { dataset, table })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stage 3: gene expression
// ---------------------------------------------------------------------------

/// The gene table of `directory`, keyed by gene identifier.
pub fn load_gene_table(cache: &AbcCache, directory: &str) -> Result<Table> {
    cache
        .get_metadata_table(directory, GENE_FILE, &ReadOptions::default())?
        .set_index(GENE_KEY)
        .context("indexing gene table")
}

/// Keep the genes whose symbol is in `symbols`, in gene-table order.
pub fn select_genes(genes: &Table, symbols: &[String]) -> Result<Table> {
    let symbol_pos = genes.column_position(GENE_SYMBOL)?;
    let mut selected = genes.clone();
    selected.retain_rows(|row| {
        row[symbol_pos]
            .as_str()
            .is_some_and(|s| symbols.iter().any(|want| want == s))
    });

    let found: HashSet<&str> = selected
        .rows()
        .iter()
        .filter_map(|row| row[symbol_pos].as_str())
        .collect();
    for missing in symbols.iter().filter(|s| !found.contains(s.as_str())) {
        log::warn!("gene symbol '{missing}' not found in gene table");
    }
    Ok(selected)
}

/// Gene identifiers of a selected gene table with their symbols.
fn gene_pairs(genes: &Table) -> Result<Vec<(String, String)>> {
    let symbols = genes.column(GENE_SYMBOL)?;
    Ok(genes
        .index()
        .iter()
        .zip(symbols)
        .map(|(id, symbol)| (id.to_field(), symbol.to_field()))
        .collect())
}

/// Join the expression of `genes` onto each table, one column per gene
/// named by its symbol. Cells absent from a matrix get `Null`.
pub fn add_gene_expression(
    cache: &AbcCache,
    tables: Vec<DatasetTable>,
    genes: &Table,
) -> Result<Vec<DatasetTable>> {
    let pairs = gene_pairs(genes)?;
    let gene_ids: Vec<String> = pairs.iter().map(|(id, _)| id.clone()).collect();
    let renames: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(id, symbol)| (id.as_str(), symbol.as_str()))
        .collect();
    log::info!("Finding expression data for {} genes", gene_ids.len());

    let mut out = Vec::with_capacity(tables.len());
    for DatasetTable { dataset, table } in tables {
        let path = cache.get_data_path(&dataset, &log2_matrix_name(&dataset))?;
        let matrix = ExpressionMatrix::open(&path)?;
        log::debug!("{dataset}: matrix holds {} cells", matrix.n_cells());

        let start = Instant::now();
        let cells: HashSet<Value> = table.index().iter().cloned().collect();
        let mut expression = matrix
            .read_genes(&gene_ids, Some(&cells))
            .with_context(|| format!("reading expression of {dataset}"))?;
        matrix.close();

        expression.rename_columns(&renames);
        let table = table
            .join(&expression, None, JoinHow::Left)
            .with_context(|| format!("joining expression onto {dataset}"))?;
        log::info!("{dataset} - time taken: {:.3?}", start.elapsed());

        out.push(DatasetTable { dataset, table });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Stage 4: combine
// ---------------------------------------------------------------------------

/// Row-wise union of all dataset tables. With `dataset_column`, each row
/// records the dataset it came from.
pub fn combine(tables: &[DatasetTable], dataset_column: Option<&str>) -> Result<Table> {
    let Some(column) = dataset_column else {
        return Ok(Table::concat(tables.iter().map(|d| &d.table)));
    };

    let mut labelled = Vec::with_capacity(tables.len());
    for DatasetTable { dataset, table } in tables {
        if table.has_column(column) {
            bail!("{dataset} already has a '{column}' column");
        }
        let mut t = table.clone();
        t.insert_constant_column(column, Value::String(dataset.clone()));
        labelled.push(t);
    }
    Ok(Table::concat(&labelled))
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Per-dataset tables after the expression join.
    pub datasets: Vec<DatasetTable>,
    /// All datasets stacked.
    pub combined: Table,
    /// Symbols of the gene columns that were joined.
    pub gene_symbols: Vec<String>,
}

pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let cache = AbcCache::from_cache_dir(&config.cache_dir)?;
    let listed = cache.list_directories();
    if let Some(missing) = config.datasets.iter().find(|d| !listed.contains(&d.as_str())) {
        bail!(
            "dataset '{missing}' is not in the cache manifest (listed: {})",
            listed.join(", ")
        );
    }

    log::info!("Creating cell_extended...");
    let extended = create_cell_extended(&cache, &config.datasets)?;
    let filtered = filter_cell_extended(extended, &config.population())?;

    let genes = load_gene_table(&cache, config.gene_directory()?)?;
    let genes = select_genes(&genes, &config.genes)?;
    let gene_symbols = gene_pairs(&genes)?.into_iter().map(|(_, s)| s).collect();

    let datasets = add_gene_expression(&cache, filtered, &genes)?;
    let combined = combine(&datasets, config.dataset_column.as_deref())?;
    log::info!(
        "Combined {} cells from {} datasets",
        combined.len(),
        datasets.len()
    );

    Ok(PipelineOutput {
        datasets,
        combined,
        gene_symbols,
    })
}
