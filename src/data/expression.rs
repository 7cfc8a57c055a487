use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};

use super::model::{Table, Value};

/// Column of the matrix file holding the cell identifier.
pub const CELL_COLUMN: &str = "cell_label";

// ---------------------------------------------------------------------------
// Backed expression matrix
// ---------------------------------------------------------------------------

/// A cells × genes expression matrix stored as Parquet, one column per gene
/// identifier plus [`CELL_COLUMN`].
///
/// Opening reads only the footer. Gene columns are materialised on demand
/// through column projection, so the full matrix never sits in memory. The
/// file handle is released by [`ExpressionMatrix::close`] or on drop.
pub struct ExpressionMatrix {
    path: PathBuf,
    file: File,
    metadata: ArrowReaderMetadata,
    cell_column: usize,
}

impl ExpressionMatrix {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening expression matrix {}", path.display()))?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new())
            .with_context(|| format!("reading parquet metadata of {}", path.display()))?;
        let cell_column = metadata
            .schema()
            .index_of(CELL_COLUMN)
            .map_err(|_| anyhow!("{} has no '{CELL_COLUMN}' column", path.display()))?;
        let label_type = metadata.schema().field(cell_column).data_type();
        if !matches!(label_type, DataType::Utf8 | DataType::LargeUtf8) {
            bail!(
                "{}: '{CELL_COLUMN}' must be text to match cell metadata, found {label_type:?}",
                path.display()
            );
        }

        log::debug!("opened expression matrix {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            metadata,
            cell_column,
        })
    }

    /// Number of cells (rows) in the matrix.
    pub fn n_cells(&self) -> usize {
        self.metadata.metadata().file_metadata().num_rows().max(0) as usize
    }

    /// Materialise the requested gene columns as a table indexed by
    /// [`CELL_COLUMN`], one column per gene identifier in request order.
    ///
    /// When `cells` is given, only those cells are kept. Unknown gene
    /// identifiers are an error.
    pub fn read_genes(&self, gene_ids: &[String], cells: Option<&HashSet<Value>>) -> Result<Table> {
        let schema = self.metadata.schema();
        let mut roots = vec![self.cell_column];
        for id in gene_ids {
            let idx = schema
                .index_of(id)
                .map_err(|_| anyhow!("gene '{id}' not found in {}", self.path.display()))?;
            roots.push(idx);
        }

        let mask = ProjectionMask::roots(self.metadata.parquet_schema(), roots);
        let handle = self.file.try_clone().context("duplicating matrix file handle")?;
        let reader =
            ParquetRecordBatchReaderBuilder::new_with_metadata(handle, self.metadata.clone())
                .with_projection(mask)
                .build()
                .context("building projected parquet reader")?;

        let mut table = Table::with_index(CELL_COLUMN, gene_ids.to_vec());

        for batch_result in reader {
            let batch = batch_result.context("reading expression batch")?;
            let labels = batch
                .column_by_name(CELL_COLUMN)
                .context("projected batch lost the cell column")?;
            let gene_cols: Vec<&ArrayRef> = gene_ids
                .iter()
                .map(|id| {
                    batch
                        .column_by_name(id)
                        .with_context(|| format!("projected batch lost gene '{id}'"))
                })
                .collect::<Result<_>>()?;

            for row in 0..batch.num_rows() {
                let cell = extract_value(labels, row)?;
                if let Some(wanted) = cells {
                    if !wanted.contains(&cell) {
                        continue;
                    }
                }
                let values = gene_cols
                    .iter()
                    .map(|col| extract_value(col, row))
                    .collect::<Result<Vec<_>>>()?;
                table.push_row(cell, values)?;
            }
        }
        Ok(table)
    }

    /// Release the backing file.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ExpressionMatrix {
    fn drop(&mut self) {
        log::debug!("released expression matrix {}", self.path.display());
    }
}

// -- Arrow helpers --

/// Extract a single value from an Arrow column at a given row.
fn extract_value(col: &ArrayRef, row: usize) -> Result<Value> {
    if col.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => Value::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Float32 => Value::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Value::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Int32 => Value::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Value::Integer(col.as_primitive::<Int64Type>().value(row)),
        other => bail!("unsupported matrix column type {other:?}"),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float32Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    fn write_matrix(path: &Path) {
        let schema = Arc::new(Schema::new(vec![
            Field::new(CELL_COLUMN, DataType::Utf8, false),
            Field::new("ENSMUSG01", DataType::Float32, false),
            Field::new("ENSMUSG02", DataType::Float32, false),
            Field::new("ENSMUSG03", DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["c1", "c2", "c3"])),
                Arc::new(Float32Array::from(vec![1.0, 2.0, 3.0])),
                Arc::new(Float32Array::from(vec![0.5, 0.0, 0.25])),
                Arc::new(Float32Array::from(vec![9.0, 9.0, 9.0])),
            ],
        )
        .unwrap();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_only_requested_genes_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log2.parquet");
        write_matrix(&path);

        let matrix = ExpressionMatrix::open(&path).unwrap();
        assert_eq!(matrix.n_cells(), 3);

        let genes = vec!["ENSMUSG02".to_string(), "ENSMUSG01".to_string()];
        let t = matrix.read_genes(&genes, None).unwrap();
        matrix.close();

        assert_eq!(t.columns(), ["ENSMUSG02", "ENSMUSG01"]);
        assert_eq!(t.index_name(), Some(CELL_COLUMN));
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(2, "ENSMUSG02"), Some(&Value::Float(0.25)));
        assert_eq!(t.get(1, "ENSMUSG01"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn restricts_rows_to_requested_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log2.parquet");
        write_matrix(&path);

        let matrix = ExpressionMatrix::open(&path).unwrap();
        let cells: HashSet<Value> = [Value::from("c3")].into_iter().collect();
        let t = matrix
            .read_genes(&["ENSMUSG01".to_string()], Some(&cells))
            .unwrap();
        assert_eq!(t.index(), [Value::from("c3")]);

        let none = matrix
            .read_genes(&["ENSMUSG01".to_string()], Some(&HashSet::new()))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_gene_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log2.parquet");
        write_matrix(&path);

        let matrix = ExpressionMatrix::open(&path).unwrap();
        let err = matrix.read_genes(&["ENSMUSG99".to_string()], None).unwrap_err();
        assert!(err.to_string().contains("ENSMUSG99"));
    }

    #[test]
    fn integer_cell_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log2.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new(CELL_COLUMN, DataType::Int64, false),
            Field::new("ENSMUSG01", DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1001, 1002, 1003])),
                Arc::new(Float32Array::from(vec![1.0, 2.0, 3.0])),
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = ExpressionMatrix::open(&path).err().unwrap().to_string();
        assert!(err.contains("log2.parquet"));
        assert!(err.contains("Int64"));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ExpressionMatrix::open(&dir.path().join("absent.parquet")).is_err());
    }
}
