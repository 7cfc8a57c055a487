//! Write a small synthetic atlas cache: taxonomy and parcellation tables,
//! three MERFISH-like datasets with CCF coordinates, and one log2 expression
//! matrix per dataset, plus the `manifest.json` describing them.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use serde_json::{Value, json};

const DATASETS: [&str; 3] = ["Zhuang-ABCA-1", "Zhuang-ABCA-2", "Zhuang-ABCA-3"];
const SECTIONS_PER_DATASET: usize = 4;
const CELLS_PER_SECTION: usize = 400;

/// (symbol, identifier)
const GENES: [(&str, &str); 11] = [
    ("Slc17a6", "ENSMUSG00000030500"),
    ("Slc32a1", "ENSMUSG00000037771"),
    ("Gnrh1", "ENSMUSG00000015812"),
    ("Esr1", "ENSMUSG00000019768"),
    ("Esr2", "ENSMUSG00000021055"),
    ("Npy1", "ENSMUSG00000029819"),
    ("Npy2", "ENSMUSG00000028004"),
    ("Cyp19a1", "ENSMUSG00000032274"),
    ("Tac2", "ENSMUSG00000025400"),
    ("Crhr1", "ENSMUSG00000018634"),
    ("Crhr2", "ENSMUSG00000003476"),
];

/// (alias, neurotransmitter, class, subclass, colour)
const CLUSTERS: [(i64, &str, &str, &str, &str); 5] = [
    (1, "Glut", "01 OB-CR Glut", "0001 OB-out Frmd7 Glut", "#2B93DF"),
    (2, "Glut", "01 OB-CR Glut", "0002 OB-in Frmd7 Glut", "#5BB0F0"),
    (3, "GABA", "02 OB-IMN GABA", "0003 OB Dopa-Gaba", "#FF3358"),
    (4, "GABA", "02 OB-IMN GABA", "0004 OB-in Gaba", "#DD5C36"),
    (5, "", "30 Astro-Epen", "0005 Astro-OLF NN", "#8B4513"),
];

/// (index, division, structure, substructure, colour)
const PARCELS: [(i64, &str, &str, &str, &str); 4] = [
    (0, "unassigned", "unassigned", "unassigned", "#000000"),
    (10, "OLF", "AOB", "AOBmi", "#9DF0D2"),
    (11, "OLF", "MOB", "MOB", "#9AD2BD"),
    (12, "OLF", "AON", "AON", "#54BF94"),
];

#[derive(Parser, Debug)]
#[command(about = "Write a synthetic atlas cache for the explorer")]
struct Args {
    /// Directory to create the cache in.
    #[arg(default_value = "abc_atlas")]
    out: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next_u64() % items.len() as u64) as usize]
    }
}

// ---------------------------------------------------------------------------
// Synthetic cells
// ---------------------------------------------------------------------------

struct Cell {
    label: String,
    section: String,
    cluster: i64,
    xy: [f64; 3],
    ccf: Option<([f64; 3], i64)>,
}

/// Parcel of a point on the section: AOB in the dorsal-caudal corner, MOB
/// around it, AON behind.
fn parcel_at(x: f64, y: f64) -> i64 {
    if x > 8.0 && y < 3.5 {
        10
    } else if x > 5.0 {
        11
    } else if x > 2.0 {
        12
    } else {
        0
    }
}

fn cluster_for(parcel: i64, rng: &mut SimpleRng) -> i64 {
    match parcel {
        10 => *rng.pick(&[1, 1, 2, 3, 5]),
        11 => *rng.pick(&[1, 2, 3, 4, 4, 5]),
        12 => *rng.pick(&[2, 4, 5]),
        _ => 5,
    }
}

fn generate_cells(dataset_idx: usize, rng: &mut SimpleRng) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(SECTIONS_PER_DATASET * CELLS_PER_SECTION);
    for s in 0..SECTIONS_PER_DATASET {
        let section = format!("Zhuang-ABCA-{}.{:03}", dataset_idx + 1, s + 1);
        let z = 0.2 * s as f64 + 0.1 * dataset_idx as f64;
        for i in 0..CELLS_PER_SECTION {
            let x = rng.uniform(0.5, 10.5);
            let y = rng.uniform(0.5, 10.5);
            let parcel = parcel_at(x, y);
            // A few cells fall outside the registered volume.
            let ccf = (rng.next_f64() > 0.05).then(|| {
                let coords = [
                    x + rng.gauss(0.0, 0.05),
                    y + rng.gauss(0.0, 0.05),
                    z + rng.gauss(0.0, 0.01),
                ];
                (coords, parcel)
            });
            cells.push(Cell {
                label: format!("{}{:02}{:05}", dataset_idx + 1, s, i),
                section: section.clone(),
                cluster: cluster_for(parcel, rng),
                xy: [x, y, z],
                ccf,
            });
        }
    }
    cells
}

/// Log2 expression of every gene in `GENES` for a cell of `cluster` in `parcel`.
fn expression(cluster: i64, parcel: i64, rng: &mut SimpleRng) -> Vec<f32> {
    let glut = matches!(cluster, 1 | 2);
    let gaba = matches!(cluster, 3 | 4);
    GENES
        .iter()
        .map(|(symbol, _)| {
            let mean = match *symbol {
                "Slc17a6" if glut => 6.0,
                "Slc32a1" if gaba => 5.5,
                "Gnrh1" | "Esr1" | "Cyp19a1" if glut && parcel == 10 => 3.0,
                "Tac2" | "Crhr1" if glut => 2.0,
                "Npy1" | "Npy2" if gaba => 2.5,
                _ => 0.2,
            };
            rng.gauss(mean, 0.6).max(0.0) as f32
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

struct CacheWriter {
    root: PathBuf,
    listing: BTreeMap<String, BTreeMap<&'static str, BTreeMap<String, Value>>>,
}

impl CacheWriter {
    fn record(
        &mut self,
        directory: &str,
        section: &'static str,
        name: &str,
        kind: &str,
        rel: &str,
    ) -> Result<()> {
        let size = fs::metadata(self.root.join(rel))?.len();
        self.listing
            .entry(directory.to_string())
            .or_default()
            .entry(section)
            .or_default()
            .insert(
                name.to_string(),
                json!({ "files": { kind: { "relative_path": rel, "size": size } } }),
            );
        Ok(())
    }

    fn csv(
        &mut self,
        directory: &str,
        name: &str,
        header: &[&str],
        rows: &[Vec<String>],
    ) -> Result<()> {
        let rel = format!("metadata/{directory}/{name}.csv");
        let path = self.root.join(&rel);
        create_parent(&path)?;
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        self.record(directory, "metadata", name, "csv", &rel)
    }

    fn matrix(&mut self, dataset: &str, labels: Vec<&str>, values: &[Vec<f32>]) -> Result<()> {
        let name = format!("{dataset}/log2");
        let rel = format!("expression_matrices/{name}.parquet");
        let path = self.root.join(&rel);
        create_parent(&path)?;

        let mut fields = vec![Field::new("cell_label", DataType::Utf8, false)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from(labels))];
        for (g, (_, id)) in GENES.iter().enumerate() {
            fields.push(Field::new(*id, DataType::Float32, false));
            let column: Vec<f32> = values.iter().map(|row| row[g]).collect();
            arrays.push(Arc::new(Float32Array::from(column)));
        }
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;

        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        self.record(dataset, "expression_matrices", &name, "parquet", &rel)
    }

    fn finish(self, version: &str) -> Result<()> {
        let manifest = json!({ "version": version, "file_listing": self.listing });
        let path = self.root.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn fmt3(v: [f64; 3]) -> [String; 3] {
    v.map(|c| format!("{c:.4}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);
    let mut cache = CacheWriter {
        root: args.out.clone(),
        listing: BTreeMap::new(),
    };

    cache.csv(
        "WMB-taxonomy",
        "cluster_to_cluster_annotation_membership_pivoted",
        &["cluster_alias", "neurotransmitter", "class", "subclass"],
        &CLUSTERS
            .iter()
            .map(|(alias, nt, class, subclass, _)| {
                vec![alias.to_string(), nt.to_string(), class.to_string(), subclass.to_string()]
            })
            .collect::<Vec<_>>(),
    )?;
    cache.csv(
        "WMB-taxonomy",
        "cluster_to_cluster_annotation_membership_color",
        &["cluster_alias", "neurotransmitter_color", "class_color", "subclass_color"],
        &CLUSTERS
            .iter()
            .map(|(alias, nt, _, _, color)| {
                let nt_color = match *nt {
                    "Glut" => "#2B93DF",
                    "GABA" => "#FF3358",
                    _ => "#666666",
                };
                vec![alias.to_string(), nt_color.to_string(), color.to_string(), color.to_string()]
            })
            .collect::<Vec<_>>(),
    )?;
    cache.csv(
        "Allen-CCF-2020",
        "parcellation_to_parcellation_term_membership_acronym",
        &["parcellation_index", "organ", "division", "structure", "substructure"],
        &PARCELS
            .iter()
            .map(|(idx, division, structure, sub, _)| {
                let organ = if *idx == 0 { "unassigned" } else { "brain" };
                vec![
                    idx.to_string(),
                    organ.into(),
                    division.to_string(),
                    structure.to_string(),
                    sub.to_string(),
                ]
            })
            .collect::<Vec<_>>(),
    )?;
    cache.csv(
        "Allen-CCF-2020",
        "parcellation_to_parcellation_term_membership_color",
        &[
            "parcellation_index",
            "organ_color",
            "division_color",
            "structure_color",
            "substructure_color",
        ],
        &PARCELS
            .iter()
            .map(|(idx, _, _, _, color)| {
                vec![
                    idx.to_string(),
                    "#FFFFFF".into(),
                    "#9AD2BD".into(),
                    color.to_string(),
                    color.to_string(),
                ]
            })
            .collect::<Vec<_>>(),
    )?;

    let gene_rows: Vec<Vec<String>> = GENES
        .iter()
        .map(|(symbol, id)| vec![id.to_string(), symbol.to_string()])
        .collect();

    let mut total = 0;
    for (d, dataset) in DATASETS.iter().enumerate() {
        let cells = generate_cells(d, &mut rng);
        total += cells.len();

        let metadata: Vec<Vec<String>> = cells
            .iter()
            .map(|c| {
                let [x, y, z] = fmt3(c.xy);
                vec![c.label.clone(), c.section.clone(), c.cluster.to_string(), x, y, z]
            })
            .collect();
        cache.csv(
            dataset,
            "cell_metadata",
            &["cell_label", "brain_section_label", "cluster_alias", "x", "y", "z"],
            &metadata,
        )?;
        cache.csv(dataset, "gene", &["gene_identifier", "gene_symbol"], &gene_rows)?;

        let ccf: Vec<Vec<String>> = cells
            .iter()
            .filter_map(|c| {
                let (coords, parcel) = c.ccf?;
                let [x, y, z] = fmt3(coords);
                Some(vec![c.label.clone(), x, y, z, parcel.to_string()])
            })
            .collect();
        cache.csv(
            &format!("{dataset}-CCF"),
            "ccf_coordinates",
            &["cell_label", "x", "y", "z", "parcellation_index"],
            &ccf,
        )?;

        let values: Vec<Vec<f32>> = cells
            .iter()
            .map(|c| {
                let parcel = c.ccf.map(|(_, p)| p).unwrap_or(0);
                expression(c.cluster, parcel, &mut rng)
            })
            .collect();
        cache.matrix(dataset, cells.iter().map(|c| c.label.as_str()).collect(), &values)?;
    }

    cache.finish("synthetic-20240330")?;
    println!(
        "Wrote {total} cells across {} datasets to {}",
        DATASETS.len(),
        args.out.display()
    );
    Ok(())
}
