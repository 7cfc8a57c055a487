use anyhow::{Context, Result};

use super::model::{Table, Value};

/// Column holding the parcellation structure acronym after the extended join.
pub const STRUCTURE_COLUMN: &str = "parcellation_structure";
/// Column holding the cluster's neurotransmitter class.
pub const NEUROTRANSMITTER_COLUMN: &str = "neurotransmitter";

// ---------------------------------------------------------------------------
// Population predicate
// ---------------------------------------------------------------------------

/// Selects a cell population by brain structure and neurotransmitter.
///
/// Matching is exact string equality: no trimming and no case folding, so a
/// label that differs only in case selects nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationFilter {
    pub structure: String,
    pub neurotransmitter: String,
}

impl PopulationFilter {
    pub fn new(structure: &str, neurotransmitter: &str) -> Self {
        Self {
            structure: structure.to_string(),
            neurotransmitter: neurotransmitter.to_string(),
        }
    }

    /// Return a copy of `table` holding only the rows that pass.
    ///
    /// A label absent from the data yields an empty table, not an error.
    /// Missing predicate columns are an error.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let structure_pos = table
            .column_position(STRUCTURE_COLUMN)
            .context("filtering by structure")?;
        let nt_pos = table
            .column_position(NEUROTRANSMITTER_COLUMN)
            .context("filtering by neurotransmitter")?;

        let mut out = table.clone();
        out.retain_rows(|row| {
            matches_exactly(&row[structure_pos], &self.structure)
                && matches_exactly(&row[nt_pos], &self.neurotransmitter)
        });
        Ok(out)
    }
}

fn matches_exactly(value: &Value, label: &str) -> bool {
    value.as_str() == Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extended() -> Table {
        let mut t = Table::with_index(
            "cell_label",
            vec![STRUCTURE_COLUMN.into(), NEUROTRANSMITTER_COLUMN.into()],
        );
        t.push_row("c1".into(), vec!["AOB".into(), "Glut".into()]).unwrap();
        t.push_row("c2".into(), vec!["AOB".into(), "GABA".into()]).unwrap();
        t.push_row("c3".into(), vec!["MOB".into(), "Glut".into()]).unwrap();
        t.push_row("c4".into(), vec![Value::Null, "Glut".into()]).unwrap();
        t
    }

    #[test]
    fn keeps_only_rows_matching_both_labels() {
        let out = PopulationFilter::new("AOB", "Glut").apply(&extended()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.index(), [Value::from("c1")]);
        for i in 0..out.len() {
            assert_eq!(out.get(i, STRUCTURE_COLUMN), Some(&Value::from("AOB")));
            assert_eq!(out.get(i, NEUROTRANSMITTER_COLUMN), Some(&Value::from("Glut")));
        }
    }

    #[test]
    fn structure_only_match_is_dropped() {
        let mut t = Table::with_index(
            "cell_label",
            vec![STRUCTURE_COLUMN.into(), NEUROTRANSMITTER_COLUMN.into()],
        );
        t.push_row("a".into(), vec!["AOB".into(), "Glut".into()]).unwrap();
        t.push_row("b".into(), vec!["AOB".into(), "Dopa".into()]).unwrap();
        let out = PopulationFilter::new("AOB", "Glut").apply(&t).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn unknown_label_yields_empty_table() {
        let out = PopulationFilter::new("XYZ", "Glut").apply(&extended()).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.columns(), extended().columns());
    }

    #[test]
    fn matching_is_case_and_whitespace_sensitive() {
        assert!(PopulationFilter::new("aob", "Glut").apply(&extended()).unwrap().is_empty());
        assert!(PopulationFilter::new("AOB ", "Glut").apply(&extended()).unwrap().is_empty());
    }

    #[test]
    fn missing_column_is_an_error() {
        let t = Table::with_index("cell_label", vec![STRUCTURE_COLUMN.into()]);
        assert!(PopulationFilter::new("AOB", "Glut").apply(&t).is_err());
    }
}
