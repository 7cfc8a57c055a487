//! Synthetic atlas cache for unit tests.
//!
//! Two datasets:
//! * `Zhuang-ABCA-1`: cells 1001 (AOB, Glut), 1002 (AOB, GABA), 1003 (no CCF)
//! * `Zhuang-ABCA-2`: cells 2001 (AOB, Glut), 2002 (MOB, Glut), 2003 (unknown cluster)

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::cache::{DirectoryListing, FileEntry, FileRecord, MANIFEST_FILE, Manifest};
use crate::pipeline::{
    CCF_COORDINATES_FILE, CELL_METADATA_FILE, CLUSTER_COLORS_FILE, CLUSTER_DETAILS_FILE,
    GENE_FILE, PARCELLATION_COLORS_FILE, PARCELLATION_DIRECTORY, PARCELLATION_TERMS_FILE,
    TAXONOMY_DIRECTORY, ccf_directory, log2_matrix_name,
};

/// Gene identifiers of Slc17a6, Gnrh1 and Esr1.
pub const GENE_IDS: [&str; 3] = ["ENSMUSG00000030500", "ENSMUSG00000015812", "ENSMUSG00000019768"];

struct Builder<'a> {
    root: &'a Path,
    manifest: Manifest,
}

impl Builder<'_> {
    fn entry(kind: &str, rel: String) -> FileEntry {
        FileEntry {
            files: [(kind.to_string(), FileRecord { relative_path: rel, size: None })]
                .into_iter()
                .collect(),
        }
    }

    fn listing(&mut self, directory: &str) -> &mut DirectoryListing {
        self.manifest
            .file_listing
            .entry(directory.to_string())
            .or_default()
    }

    fn csv(&mut self, directory: &str, file_name: &str, text: &str) {
        let rel = format!("metadata/{directory}/{file_name}.csv");
        let path = self.root.join(&rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        let entry = Self::entry("csv", rel);
        self.listing(directory)
            .metadata
            .insert(file_name.to_string(), entry);
    }

    fn matrix(&mut self, dataset: &str, cells: &[&str], columns: &[[f32; 3]]) {
        let name = log2_matrix_name(dataset);
        let rel = format!("expression_matrices/{name}.parquet");
        let path = self.root.join(&rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_matrix(&path, cells, columns);
        let entry = Self::entry("parquet", rel);
        self.listing(dataset).expression_matrices.insert(name, entry);
    }

    fn finish(self) {
        let text = serde_json::to_string_pretty(&self.manifest).unwrap();
        std::fs::write(self.root.join(MANIFEST_FILE), text).unwrap();
    }
}

/// Write a matrix with one row per cell; `columns[i]` holds cell `i`'s
/// values for [`GENE_IDS`].
pub fn write_matrix(path: &Path, cells: &[&str], columns: &[[f32; 3]]) {
    let mut fields = vec![Field::new("cell_label", DataType::Utf8, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from(cells.to_vec()))];
    for (g, id) in GENE_IDS.iter().enumerate() {
        fields.push(Field::new(*id, DataType::Float32, false));
        let values: Vec<f32> = columns.iter().map(|row| row[g]).collect();
        arrays.push(Arc::new(Float32Array::from(values)));
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Build the sample cache in a fresh temporary directory.
pub fn sample_cache() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut b = Builder {
        root: dir.path(),
        manifest: Manifest {
            version: "test-20240330".into(),
            ..Manifest::default()
        },
    };

    b.csv(
        TAXONOMY_DIRECTORY,
        CLUSTER_DETAILS_FILE,
        "cluster_alias,neurotransmitter,class,subclass\n\
         1,Glut,01 OB-IMN,0001 OB Glut\n\
         2,GABA,02 OB-GABA,0002 OB GABA\n\
         3,,03 Astro,0003 Astro\n",
    );
    b.csv(
        TAXONOMY_DIRECTORY,
        CLUSTER_COLORS_FILE,
        "cluster_alias,neurotransmitter_color,class_color,subclass_color\n\
         1,#2B93DF,#FA0087,#0F6632\n\
         2,#FF3358,#C9A600,#DD5C36\n\
         3,#666666,#00A86B,#8B4513\n",
    );
    b.csv(
        PARCELLATION_DIRECTORY,
        PARCELLATION_TERMS_FILE,
        "parcellation_index,organ,division,structure,substructure\n\
         0,unassigned,unassigned,unassigned,unassigned\n\
         10,brain,OLF,AOB,AOBmi\n\
         11,brain,OLF,MOB,MOB\n",
    );
    b.csv(
        PARCELLATION_DIRECTORY,
        PARCELLATION_COLORS_FILE,
        "parcellation_index,organ_color,division_color,structure_color,substructure_color\n\
         0,#000000,#000000,#000000,#000000\n\
         10,#FFFFFF,#9AD2BD,#9DF0D2,#9DF0D2\n\
         11,#FFFFFF,#9AD2BD,#9AD2BD,#9AD2BD\n",
    );

    let ds1 = "Zhuang-ABCA-1";
    b.csv(
        ds1,
        CELL_METADATA_FILE,
        "cell_label,brain_section_label,cluster_alias,x,y,z\n\
         1001,S1,1,1.0,2.0,0.5\n\
         1002,S1,2,1.5,2.5,0.5\n\
         1003,S2,1,3.0,4.0,0.7\n",
    );
    b.csv(
        &ccf_directory(ds1),
        CCF_COORDINATES_FILE,
        "cell_label,x,y,z,parcellation_index\n\
         1001,5.0,6.0,7.0,10\n\
         1002,5.1,6.1,7.1,10\n",
    );
    b.csv(
        ds1,
        GENE_FILE,
        &format!(
            "gene_identifier,gene_symbol,name\n\
             {},Slc17a6,vesicular glutamate transporter 2\n\
             {},Gnrh1,gonadotropin releasing hormone 1\n\
             {},Esr1,estrogen receptor 1\n",
            GENE_IDS[0], GENE_IDS[1], GENE_IDS[2]
        ),
    );
    b.matrix(
        ds1,
        &["1001", "1002", "1003"],
        &[[3.0, 1.5, 0.0], [0.2, 0.0, 1.0], [2.0, 0.0, 0.5]],
    );

    let ds2 = "Zhuang-ABCA-2";
    b.csv(
        ds2,
        CELL_METADATA_FILE,
        "cell_label,brain_section_label,cluster_alias,x,y,z\n\
         2001,T1,1,2.0,3.0,0.5\n\
         2002,T1,1,2.5,3.5,0.5\n\
         2003,T2,9,4.0,5.0,0.9\n",
    );
    b.csv(
        &ccf_directory(ds2),
        CCF_COORDINATES_FILE,
        "cell_label,x,y,z,parcellation_index\n\
         2001,6.0,7.0,8.0,10\n\
         2002,6.1,7.1,8.1,11\n\
         2003,6.2,7.2,8.2,0\n",
    );
    b.matrix(
        ds2,
        &["2001", "2002", "2003"],
        &[[4.0, 2.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 3.0]],
    );

    b.finish();
    dir
}
