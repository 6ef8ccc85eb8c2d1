//! XDMF descriptors for the container.
//!
//! The writer records what each step put into the file; on close rank 0
//! renders `fieldData.xdmf` (a temporal collection of spatial collections,
//! one uniform grid per processor with `Mixed` topology) and one
//! `<cloud>.xdmf` per cloud (`Polyvertex` topology) next to the container.

use crate::IoScalar;
use crate::io::cloud_writer::CloudAttribute;
use crate::io::mesh_writer::MeshCounts;
use crate::io::schema::{CELLS, Category, Owner, POINTS, dataset_path};
use crate::mesh_error::MeshWriteError;
use itertools::Itertools;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Name of the mesh/field descriptor.
pub const FIELD_DESCRIPTOR: &str = "fieldData.xdmf";

fn attribute_type(components: usize) -> &'static str {
    match components {
        1 => "Scalar",
        3 => "Vector",
        6 => "Tensor6",
        _ => "Tensor",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MeshRecord {
    time: String,
    points: Vec<usize>,
    cells: Vec<usize>,
    streams: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FieldStep {
    time: String,
    /// Index into `meshes` of the topology in effect.
    mesh: usize,
    /// Field names with their component counts.
    fields: Vec<(String, usize)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CloudStep {
    time: String,
    particles: usize,
    attributes: Vec<CloudAttribute>,
}

/// Everything written so far, as needed to describe the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XdmfManifest {
    meshes: Vec<MeshRecord>,
    steps: Vec<FieldStep>,
    clouds: Vec<(String, Vec<CloudStep>)>,
}

impl XdmfManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mesh(&mut self, time: &str, counts: &MeshCounts) {
        self.meshes.push(MeshRecord {
            time: time.to_owned(),
            points: counts.points.counts().to_vec(),
            cells: counts.cells.counts().to_vec(),
            streams: counts.streams.counts().to_vec(),
        });
    }

    /// Records the fields written at `time`. Ignored before any mesh.
    pub fn record_fields(&mut self, time: &str, scalars: &[String], vectors: &[String]) {
        let Some(mesh) = self.meshes.len().checked_sub(1) else {
            return;
        };
        let fields = scalars
            .iter()
            .map(|n| (n.clone(), 1))
            .chain(vectors.iter().map(|n| (n.clone(), 3)))
            .collect();
        self.steps.push(FieldStep {
            time: time.to_owned(),
            mesh,
            fields,
        });
    }

    pub fn record_cloud(
        &mut self,
        name: &str,
        time: &str,
        particles: usize,
        attributes: &[CloudAttribute],
    ) {
        let step = CloudStep {
            time: time.to_owned(),
            particles,
            attributes: CloudAttribute::ALL
                .into_iter()
                .filter(|a| attributes.contains(a))
                .collect(),
        };
        match self.clouds.iter_mut().find(|(n, _)| n == name) {
            Some((_, steps)) => steps.push(step),
            None => self.clouds.push((name.to_owned(), vec![step])),
        }
    }

    pub fn has_fields(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn cloud_names(&self) -> impl Iterator<Item = &str> {
        self.clouds.iter().map(|(n, _)| n.as_str())
    }

    /// Renders the mesh/field descriptor, or `None` when no fields were written.
    pub fn render_fields(&self, h5_name: &str) -> Result<Option<String>, MeshWriteError> {
        if self.steps.is_empty() {
            return Ok(None);
        }
        let prec = std::mem::size_of::<IoScalar>();
        let mut out = String::new();
        writeln!(out, "<Xdmf>")?;
        writeln!(out, "  <Domain>")?;
        writeln!(
            out,
            r#"    <Grid Name="FieldData" GridType="Collection" CollectionType="Temporal">"#
        )?;
        for step in &self.steps {
            let mesh = &self.meshes[step.mesh];
            writeln!(out, r#"      <Grid GridType="Collection" CollectionType="Spatial">"#)?;
            writeln!(out, r#"        <Time Type="Single" Value="{}" />"#, step.time)?;
            for proc in 0..mesh.cells.len() {
                let owner = Owner::Processor(proc);
                let cells = dataset_path(Category::Mesh, &mesh.time, owner, CELLS);
                let points = dataset_path(Category::Mesh, &mesh.time, owner, POINTS);
                writeln!(
                    out,
                    r#"        <Grid Name="time{}-processor{proc}" Type="Uniform">"#,
                    step.time
                )?;
                writeln!(
                    out,
                    r#"          <Topology Type="Mixed" NumberOfElements="{}">"#,
                    mesh.cells[proc]
                )?;
                writeln!(
                    out,
                    r#"            <DataItem Dimensions="{}" NumberType="Int" Precision="8" Format="HDF">{h5_name}:/{cells}</DataItem>"#,
                    mesh.streams[proc]
                )?;
                writeln!(out, "          </Topology>")?;
                writeln!(out, r#"          <Geometry GeometryType="XYZ">"#)?;
                writeln!(
                    out,
                    r#"            <DataItem Dimensions="{} 3" NumberType="Float" Precision="{prec}" Format="HDF">{h5_name}:/{points}</DataItem>"#,
                    mesh.points[proc]
                )?;
                writeln!(out, "          </Geometry>")?;
                for (field, components) in &step.fields {
                    let path = dataset_path(Category::Fields, &step.time, owner, field);
                    let dims = [mesh.cells[proc], *components].iter().join(" ");
                    writeln!(
                        out,
                        r#"          <Attribute Name="{field}" Center="Cell" AttributeType="{}">"#,
                        attribute_type(*components)
                    )?;
                    writeln!(
                        out,
                        r#"            <DataItem Dimensions="{dims}" NumberType="Float" Precision="{prec}" Format="HDF">{h5_name}:/{path}</DataItem>"#
                    )?;
                    writeln!(out, "          </Attribute>")?;
                }
                writeln!(out, "        </Grid>")?;
            }
            writeln!(out, "      </Grid>")?;
        }
        writeln!(out, "    </Grid>")?;
        writeln!(out, "  </Domain>")?;
        writeln!(out, "</Xdmf>")?;
        Ok(Some(out))
    }

    /// Renders the descriptor of cloud `name`, or `None` if it was never written.
    pub fn render_cloud(&self, name: &str, h5_name: &str) -> Result<Option<String>, MeshWriteError> {
        let Some((_, steps)) = self.clouds.iter().find(|(n, _)| n == name) else {
            return Ok(None);
        };
        let mut out = String::new();
        writeln!(out, "<Xdmf>")?;
        writeln!(out, "  <Domain>")?;
        writeln!(
            out,
            r#"    <Grid Name="cloudData" GridType="Collection" CollectionType="Temporal">"#
        )?;
        for step in steps {
            let owner = Owner::Cloud(name);
            writeln!(out, r#"      <Grid Name="time{}" Type="Uniform">"#, step.time)?;
            writeln!(out, r#"        <Time Type="Single" Value="{}" />"#, step.time)?;
            if step.attributes.contains(&CloudAttribute::Position) {
                let path = dataset_path(Category::Clouds, &step.time, owner, "position");
                writeln!(out, r#"        <Geometry GeometryType="XYZ">"#)?;
                writeln!(
                    out,
                    r#"          <DataItem Dimensions="{} 3" NumberType="Float" Precision="{}" Format="HDF">{h5_name}:/{path}</DataItem>"#,
                    step.particles,
                    std::mem::size_of::<IoScalar>()
                )?;
                writeln!(out, "        </Geometry>")?;
            }
            writeln!(
                out,
                r#"        <Topology Type="Polyvertex" NodesPerElement="1" NumberOfElements="{}" />"#,
                step.particles
            )?;
            for attr in &step.attributes {
                let path = dataset_path(Category::Clouds, &step.time, owner, attr.dataset_name());
                let element = attr.element_type();
                writeln!(
                    out,
                    r#"        <Attribute Name="{}" Center="Node" AttributeType="{}">"#,
                    attr.dataset_name(),
                    attribute_type(attr.components())
                )?;
                writeln!(
                    out,
                    r#"          <DataItem Dimensions="{} {}" NumberType="{}" Precision="{}" Format="HDF">{h5_name}:/{path}</DataItem>"#,
                    step.particles,
                    attr.components(),
                    element.xdmf_number_type(),
                    element.byte_width()
                )?;
                writeln!(out, "        </Attribute>")?;
            }
            writeln!(out, "      </Grid>")?;
        }
        writeln!(out, "    </Grid>")?;
        writeln!(out, "  </Domain>")?;
        writeln!(out, "</Xdmf>")?;
        Ok(Some(out))
    }

    /// Writes every descriptor into the directory of `h5_file`.
    pub fn write_descriptors(&self, h5_file: &Path) -> Result<Vec<PathBuf>, MeshWriteError> {
        let dir = h5_file.parent().unwrap_or_else(|| Path::new(""));
        let h5_name = h5_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut written = Vec::new();
        if let Some(text) = self.render_fields(&h5_name)? {
            let path = dir.join(FIELD_DESCRIPTOR);
            std::fs::write(&path, text)?;
            written.push(path);
        }
        for name in self.cloud_names() {
            if let Some(text) = self.render_cloud(name, &h5_name)? {
                let path = dir.join(format!("{name}.xdmf"));
                std::fs::write(&path, text)?;
                written.push(path);
            }
        }
        for path in &written {
            log::info!("Wrote XDMF descriptor {}", path.display());
        }
        Ok(written)
    }
}
