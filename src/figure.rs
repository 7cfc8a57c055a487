//! Shapes tables into what the viewer draws: grouped scatter points for a
//! brain section and a numeric matrix for a heatmap.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use eframe::egui::Color32;

use crate::color::{ColorMap, ContinuousColorMap};
use crate::data::model::{Table, Value};
use crate::pipeline::{DatasetTable, SECTION_COLUMN};

/// Reconstructed section coordinates of a cell.
pub const X_COLUMN: &str = "x";
pub const Y_COLUMN: &str = "y";

/// Distinct colour levels a scalar scatter is quantised into.
const SCALAR_LEVELS: usize = 32;

/// How scatter points are coloured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorBy {
    /// One colour per distinct value; hex strings are used as-is.
    Category(String),
    /// A numeric column through the continuous colour map.
    Scalar(String),
}

impl ColorBy {
    pub fn column(&self) -> &str {
        match self {
            ColorBy::Category(c) | ColorBy::Scalar(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    pub label: String,
    pub color: Color32,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionScatter {
    pub title: String,
    pub groups: Vec<PointGroup>,
}

impl SectionScatter {
    pub fn n_points(&self) -> usize {
        self.groups.iter().map(|g| g.points.len()).sum()
    }
}

/// Distinct section labels present in a table, sorted.
pub fn section_labels(table: &Table) -> Vec<String> {
    let Ok(values) = table.column(SECTION_COLUMN) else {
        return Vec::new();
    };
    let distinct: BTreeSet<String> = values
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| v.to_field())
        .collect();
    distinct.into_iter().collect()
}

/// The column labelling a colour column's legend: `subclass` for
/// `subclass_color` when present, otherwise the colour column itself.
pub fn legend_column(table: &Table, color_column: &str) -> String {
    match color_column.strip_suffix("_color") {
        Some(base) if table.has_column(base) => base.to_string(),
        _ => color_column.to_string(),
    }
}

/// Scatter the cells of one dataset, restricted to `section` when given.
pub fn section_scatter(
    ds: &DatasetTable,
    section: Option<&str>,
    color_by: &ColorBy,
    vmax: Option<f64>,
) -> Result<SectionScatter> {
    let table = &ds.table;
    let xs = table.column(X_COLUMN)?;
    let ys = table.column(Y_COLUMN)?;
    let colors = table.column(color_by.column())?;
    let sections = match section {
        Some(_) => Some(table.column(SECTION_COLUMN)?),
        None => None,
    };

    let in_section = |i: usize| match (&sections, section) {
        (Some(s), Some(label)) => s[i].as_str() == Some(label),
        _ => true,
    };
    let point = |i: usize| Some([xs[i].as_f64()?, ys[i].as_f64()?]);

    let groups = match color_by {
        ColorBy::Category(column) => {
            let labels = table.column(&legend_column(table, column))?;
            let distinct: BTreeSet<Value> = colors.iter().map(|v| (*v).clone()).collect();
            let map = ColorMap::new(&distinct);

            let mut grouped: BTreeMap<&Value, PointGroup> = BTreeMap::new();
            for i in (0..table.len()).filter(|&i| in_section(i)) {
                let Some(p) = point(i) else { continue };
                grouped
                    .entry(colors[i])
                    .or_insert_with(|| PointGroup {
                        label: labels[i].to_string(),
                        color: map.color_for(colors[i]),
                        points: Vec::new(),
                    })
                    .points
                    .push(p);
            }
            grouped.into_values().collect()
        }
        ColorBy::Scalar(_) => {
            let cmap = ContinuousColorMap::fit(colors.iter().filter_map(|v| v.as_f64()), vmax);
            let mut levels: BTreeMap<Option<usize>, Vec<[f64; 2]>> = BTreeMap::new();
            for i in (0..table.len()).filter(|&i| in_section(i)) {
                let Some(p) = point(i) else { continue };
                let level = colors[i]
                    .as_f64()
                    .map(|v| (cmap.normalize(v) * (SCALAR_LEVELS - 1) as f32).round() as usize);
                levels.entry(level).or_default().push(p);
            }
            levels
                .into_iter()
                .map(|(level, points)| match level {
                    Some(l) => PointGroup {
                        label: String::new(),
                        color: cmap.color_at(l as f32 / (SCALAR_LEVELS - 1) as f32),
                        points,
                    },
                    None => PointGroup {
                        label: "missing".to_string(),
                        color: Color32::GRAY,
                        points,
                    },
                })
                .collect()
        }
    };

    let title = match section {
        Some(s) => format!("{} ({s})", ds.dataset),
        None => ds.dataset.clone(),
    };
    Ok(SectionScatter { title, groups })
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

/// Cells × columns matrix of numeric values. Missing values are `NaN`.
#[derive(Debug, Clone)]
pub struct Heatmap {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
    pub color_map: ContinuousColorMap,
}

pub fn heatmap(table: &Table, columns: &[String], vmax: Option<f64>) -> Result<Heatmap> {
    let cols = columns
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<Vec<_>, _>>()?;

    let values: Vec<Vec<f64>> = (0..table.len())
        .map(|row| {
            cols.iter()
                .map(|col| col[row].as_f64().unwrap_or(f64::NAN))
                .collect()
        })
        .collect();
    let color_map = ContinuousColorMap::fit(values.iter().flatten().copied(), vmax);

    Ok(Heatmap {
        row_labels: table.index().iter().map(|v| v.to_field()).collect(),
        column_labels: columns.to_vec(),
        values,
        color_map,
    })
}
