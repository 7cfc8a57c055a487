use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Value – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed table value mirroring the dtypes of the atlas CSVs.
/// Values are used as join keys, so `Value` must be `Eq + Hash + Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet / HashMap keys --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl Value {
    /// Try to interpret the value as an `f64` for numeric colour mapping.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Borrow the text of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lossless text form used when writing tables back out.
    /// `Null` becomes the empty string.
    pub fn to_field(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("duplicate key {key} in index '{index}'")]
    DuplicateKey { index: String, key: Value },

    #[error("columns overlap on join: {0:?}")]
    OverlappingColumns(Vec<String>),

    #[error("row has {got} values but table has {expected} columns")]
    RowWidth { expected: usize, got: usize },
}

// ---------------------------------------------------------------------------
// Table – an indexed, row-oriented frame
// ---------------------------------------------------------------------------

/// How unmatched rows are treated by [`Table::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    /// Keep every left row; unmatched right columns become `Null`.
    Left,
    /// Keep only left rows with a match on the right.
    Inner,
}

/// A table of rows keyed by an index.
///
/// Until [`Table::set_index`] is called the index is the row position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    index_name: Option<String>,
    index: Vec<Value>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Empty table with the given columns and a positional index.
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            index_name: None,
            index: Vec::new(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Empty table with the given columns and a named index.
    pub fn with_index(index_name: &str, columns: Vec<String>) -> Self {
        Table {
            index_name: Some(index_name.to_string()),
            ..Table::new(columns)
        }
    }

    /// Append a row under `key`.
    pub fn push_row(&mut self, key: Value, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.index.push(key);
        self.rows.push(row);
        Ok(())
    }

    /// Append a row keyed by its position.
    pub fn push_positional(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        let key = Value::Integer(self.rows.len() as i64);
        self.push_row(key, row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[Value] {
        &self.index
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_position(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let pos = self.column_position(name)?;
        Ok(self.rows.iter().map(|r| &r[pos]).collect())
    }

    #[cfg(test)]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let pos = self.column_position(column).ok()?;
        self.rows.get(row).map(|r| &r[pos])
    }

    /// Row position of an index key, if present.
    #[cfg(test)]
    pub fn position_of(&self, key: &Value) -> Option<usize> {
        self.index.iter().position(|k| k == key)
    }

    /// Number of distinct non-null values in a column (the size of a
    /// group-by, which drops missing keys).
    pub fn n_unique(&self, column: &str) -> Result<usize, TableError> {
        let pos = self.column_position(column)?;
        let distinct: BTreeSet<&Value> = self
            .rows
            .iter()
            .map(|r| &r[pos])
            .filter(|v| !v.is_null())
            .collect();
        Ok(distinct.len())
    }

    /// Move a column into the index. Keys must be unique.
    pub fn set_index(mut self, column: &str) -> Result<Table, TableError> {
        let pos = self.column_position(column)?;
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut index = Vec::with_capacity(self.rows.len());
        for row in &mut self.rows {
            let key = row.remove(pos);
            if !seen.insert(key.clone()) {
                return Err(TableError::DuplicateKey {
                    index: column.to_string(),
                    key,
                });
            }
            index.push(key);
        }
        self.columns.remove(pos);
        self.index = index;
        self.index_name = Some(column.to_string());
        Ok(self)
    }

    /// Rename columns by `(from, to)` pairs. Unknown names are ignored.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        for col in &mut self.columns {
            if let Some((_, to)) = renames.iter().find(|(from, _)| *from == col.as_str()) {
                *col = to.to_string();
            }
        }
    }

    /// Rename every column to `{prefix}{name}`.
    pub fn prefix_columns(&mut self, prefix: &str) {
        for col in &mut self.columns {
            *col = format!("{prefix}{col}");
        }
    }

    /// Add a constant-valued column in front of the others.
    pub fn insert_constant_column(&mut self, name: &str, value: Value) {
        self.columns.insert(0, name.to_string());
        for row in &mut self.rows {
            row.insert(0, value.clone());
        }
    }

    /// Keep only rows for which `keep(row_values)` holds.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) {
        let mut index = Vec::with_capacity(self.index.len());
        let mut rows = Vec::with_capacity(self.rows.len());
        for (key, row) in self.index.drain(..).zip(self.rows.drain(..)) {
            if keep(&row) {
                index.push(key);
                rows.push(row);
            }
        }
        self.index = index;
        self.rows = rows;
    }

    /// Join `right` onto `self`, matching either a column of `self` (`on`) or
    /// the index of `self` against the index of `right`. `right` keys must be
    /// unique, so the join is many-to-one and never multiplies rows.
    pub fn join(&self, right: &Table, on: Option<&str>, how: JoinHow) -> Result<Table, TableError> {
        let overlap: Vec<String> = right
            .columns
            .iter()
            .filter(|c| self.has_column(c))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(TableError::OverlappingColumns(overlap));
        }

        let key_pos = on.map(|col| self.column_position(col)).transpose()?;

        let mut lookup: HashMap<&Value, usize> = HashMap::with_capacity(right.len());
        for (i, key) in right.index.iter().enumerate() {
            if lookup.insert(key, i).is_some() {
                return Err(TableError::DuplicateKey {
                    index: right.index_name.clone().unwrap_or_default(),
                    key: key.clone(),
                });
            }
        }

        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        let mut out = Table {
            index_name: self.index_name.clone(),
            index: Vec::with_capacity(self.len()),
            columns,
            rows: Vec::with_capacity(self.len()),
        };

        for (key, row) in self.index.iter().zip(&self.rows) {
            let probe = match key_pos {
                Some(pos) => &row[pos],
                None => key,
            };
            let matched = lookup.get(probe).map(|&i| &right.rows[i]);
            let extra: Vec<Value> = match (matched, how) {
                (Some(r), _) => r.clone(),
                (None, JoinHow::Left) => vec![Value::Null; right.columns.len()],
                (None, JoinHow::Inner) => continue,
            };
            let mut joined = row.clone();
            joined.extend(extra);
            out.index.push(key.clone());
            out.rows.push(joined);
        }
        Ok(out)
    }

    /// Row-wise union. The column set is the union of all inputs in order of
    /// first appearance; columns a table lacks are filled with `Null`.
    pub fn concat<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        let tables: Vec<&Table> = tables.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let index_name = match tables.first() {
            Some(first) if tables.iter().all(|t| t.index_name == first.index_name) => {
                first.index_name.clone()
            }
            _ => None,
        };

        let mut out = Table {
            index_name,
            index: Vec::new(),
            columns,
            rows: Vec::new(),
        };
        for t in tables {
            let positions: Vec<Option<usize>> = out
                .columns
                .iter()
                .map(|c| t.column_position(c).ok())
                .collect();
            for (key, row) in t.index.iter().zip(&t.rows) {
                let aligned = positions
                    .iter()
                    .map(|p| p.map(|i| row[i].clone()).unwrap_or(Value::Null))
                    .collect();
                out.index.push(key.clone());
                out.rows.push(aligned);
            }
        }
        out
    }
}
