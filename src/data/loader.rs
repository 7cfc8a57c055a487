use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::model::{Table, Value};

/// Tokens read as missing when `keep_default_na` is on.
const DEFAULT_NA_VALUES: &[&str] = &["", "NA", "N/A", "NaN", "nan", "NULL", "null"];

// ---------------------------------------------------------------------------
// Read options
// ---------------------------------------------------------------------------

/// Hints for reading a metadata CSV, mirroring the `dtype` and
/// `keep_default_na` arguments of the atlas cache client.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Columns always read as text, whatever they look like.
    pub string_columns: Vec<String>,
    /// Treat the default NA tokens as missing. When off, they stay text.
    pub keep_default_na: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            string_columns: Vec::new(),
            keep_default_na: true,
        }
    }
}

impl ReadOptions {
    pub fn string_column(mut self, name: &str) -> Self {
        self.string_columns.push(name.to_string());
        self
    }

    pub fn keep_default_na(mut self, keep: bool) -> Self {
        self.keep_default_na = keep;
        self
    }
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// Read a CSV with a header row into a positionally indexed [`Table`].
pub fn read_csv(path: &Path, options: &ReadOptions) -> Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    read_csv_from(file, options).with_context(|| format!("reading CSV {}", path.display()))
}

/// Read CSV text from any reader. Column types are inferred per column:
/// integer, then float, then boolean, falling back to text.
pub fn read_csv_from<R: Read>(input: R, options: &ReadOptions) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut raw: Vec<csv::StringRecord> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: {} fields but header has {}",
                record.len(),
                headers.len()
            );
        }
        raw.push(record);
    }

    let kinds: Vec<ColumnKind> = headers
        .iter()
        .enumerate()
        .map(|(col, name)| {
            if options.string_columns.iter().any(|s| s == name) {
                ColumnKind::Text
            } else {
                infer_column(raw.iter().map(|r| &r[col]), options.keep_default_na)
            }
        })
        .collect();

    let mut table = Table::new(headers);
    for record in &raw {
        let row = record
            .iter()
            .zip(&kinds)
            .map(|(field, kind)| parse_field(field, *kind, options.keep_default_na))
            .collect();
        table.push_positional(row)?;
    }
    Ok(table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Bool,
    Text,
}

fn is_na(s: &str, keep_default_na: bool) -> bool {
    keep_default_na && DEFAULT_NA_VALUES.contains(&s)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn infer_column<'a>(fields: impl Iterator<Item = &'a str>, keep_default_na: bool) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for s in fields {
        if is_na(s, keep_default_na) {
            continue;
        }
        let this = if s.parse::<i64>().is_ok() {
            ColumnKind::Integer
        } else if s.parse::<f64>().is_ok() {
            ColumnKind::Float
        } else if parse_bool(s).is_some() {
            ColumnKind::Bool
        } else {
            return ColumnKind::Text;
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Integer), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
            _ => return ColumnKind::Text,
        });
    }
    // An all-missing column stays text, as an object column would.
    kind.unwrap_or(ColumnKind::Text)
}

fn parse_field(s: &str, kind: ColumnKind, keep_default_na: bool) -> Value {
    if is_na(s, keep_default_na) {
        return Value::Null;
    }
    match kind {
        ColumnKind::Integer => s.parse().map(Value::Integer).unwrap_or(Value::Null),
        ColumnKind::Float => s.parse().map(Value::Float).unwrap_or(Value::Null),
        ColumnKind::Bool => parse_bool(s).map(Value::Bool).unwrap_or(Value::Null),
        ColumnKind::Text => Value::String(s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write a table to disk. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, index as the first column
/// * `.parquet` – one Arrow column per table column, index first
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => write_csv(table, path),
        "parquet" | "pq" => write_parquet(table, path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

fn index_header(table: &Table) -> String {
    table.index_name().unwrap_or("index").to_string()
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    let mut header = vec![index_header(table)];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header).context("writing CSV header")?;

    for (key, row) in table.index().iter().zip(table.rows()) {
        let mut record = vec![key.to_field()];
        record.extend(row.iter().map(Value::to_field));
        writer.write_record(&record).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;
    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Convert a table (index first) into a single Arrow record batch.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len() + 1);

    let index: Vec<&Value> = table.index().iter().collect();
    let (dtype, array) = to_arrow_column(&index);
    fields.push(Field::new(index_header(table), dtype, true));
    arrays.push(array);

    for name in table.columns() {
        let values = table.column(name)?;
        let (dtype, array) = to_arrow_column(&values);
        fields.push(Field::new(name.clone(), dtype, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).context("building record batch")
}

/// Pick the narrowest Arrow type that holds every non-null value.
fn to_arrow_column(values: &[&Value]) -> (DataType, ArrayRef) {
    let non_null = || values.iter().filter(|v| !v.is_null());

    if non_null().all(|v| matches!(v, Value::Integer(_))) && non_null().next().is_some() {
        let arr: Int64Array = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        return (DataType::Int64, Arc::new(arr));
    }
    if non_null().all(|v| v.as_f64().is_some()) && non_null().next().is_some() {
        let arr: Float64Array = values.iter().map(|v| v.as_f64()).collect();
        return (DataType::Float64, Arc::new(arr));
    }
    if non_null().all(|v| matches!(v, Value::Bool(_))) && non_null().next().is_some() {
        let arr: BooleanArray = values
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return (DataType::Boolean, Arc::new(arr));
    }
    let arr: StringArray = values
        .iter()
        .map(|v| (!v.is_null()).then(|| v.to_field()))
        .collect();
    (DataType::Utf8, Arc::new(arr))
}

/// Render the first `n_rows` rows as a text grid for the terminal.
pub fn preview(table: &Table, n_rows: usize) -> Result<String> {
    let batch = to_record_batch(table)?;
    let head = batch.slice(0, n_rows.min(batch.num_rows()));
    let text = arrow::util::pretty::pretty_format_batches(&[head])
        .context("formatting table preview")?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    const CELLS: &str = "\
cell_label,brain_section_label,cluster_alias,x,neurotransmitter
001,S1,12,1.5,Glut
002,S1,13,2,
003,S2,12,NA,NA
";

    #[test]
    fn infers_column_types() {
        let t = read_csv_from(CELLS.as_bytes(), &ReadOptions::default()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(0, "cell_label"), Some(&Value::Integer(1)));
        assert_eq!(t.get(0, "cluster_alias"), Some(&Value::Integer(12)));
        assert_eq!(t.get(1, "x"), Some(&Value::Float(2.0)));
        assert_eq!(t.get(2, "x"), Some(&Value::Null));
        assert_eq!(t.get(1, "neurotransmitter"), Some(&Value::Null));
    }

    #[test]
    fn string_columns_keep_leading_zeros() {
        let opts = ReadOptions::default().string_column("cell_label");
        let t = read_csv_from(CELLS.as_bytes(), &opts).unwrap();
        assert_eq!(t.get(0, "cell_label"), Some(&Value::from("001")));
    }

    #[test]
    fn keep_default_na_off_preserves_text() {
        let opts = ReadOptions::default().keep_default_na(false);
        let t = read_csv_from(CELLS.as_bytes(), &opts).unwrap();
        assert_eq!(t.get(1, "neurotransmitter"), Some(&Value::from("")));
        assert_eq!(t.get(2, "neurotransmitter"), Some(&Value::from("NA")));
        // "NA" in a numeric column now makes it text.
        assert_eq!(t.get(0, "x"), Some(&Value::from("1.5")));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let text = "a,b\n1,2\n3\n";
        assert!(read_csv_from(text.as_bytes(), &ReadOptions::default()).is_err());
    }

    fn small_table() -> Table {
        let mut t = Table::with_index(
            "cell_label",
            vec!["dataset".into(), "Gnrh1".into(), "n".into()],
        );
        t.push_row("c1".into(), vec!["A".into(), 0.5f64.into(), 1i64.into()])
            .unwrap();
        t.push_row("c2".into(), vec!["B".into(), Value::Null, 2i64.into()])
            .unwrap();
        t
    }

    #[test]
    fn csv_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.csv");
        write_table(&small_table(), &path).unwrap();

        let back = read_csv(&path, &ReadOptions::default()).unwrap();
        assert_eq!(back.columns(), ["cell_label", "dataset", "Gnrh1", "n"]);
        assert_eq!(back.get(1, "Gnrh1"), Some(&Value::Null));
        assert_eq!(back.get(0, "Gnrh1"), Some(&Value::Float(0.5)));
    }

    #[test]
    fn parquet_export_types_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.parquet");
        write_table(&small_table(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let schema = builder.schema().clone();
        assert_eq!(schema.field(0).name(), "cell_label");
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Int64);
        let rows: usize = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }

    #[test]
    fn unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_table(&small_table(), &dir.path().join("out.xlsx")).is_err());
    }

    #[test]
    fn preview_lists_columns() {
        let text = preview(&small_table(), 1).unwrap();
        assert!(text.contains("Gnrh1"));
        assert!(text.contains("c1"));
        assert!(!text.contains("c2"));
    }
}
