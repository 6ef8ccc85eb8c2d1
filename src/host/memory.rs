//! In-memory host: a registry of named fields and clouds over one local mesh.
//!
//! Useful for tests and for drivers that assemble their state outside a
//! solver framework.

use crate::host::{CloudSource, FieldKind, FieldLookup, FieldRegistry, Particle, SimulationHost};
use crate::topology::mesh::LocalMesh;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Scalar(Vec<f64>),
    Vector(Vec<[f64; 3]>),
    Opaque(FieldKind),
}

/// Host state kept in plain collections.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHost {
    time_name: String,
    mesh: LocalMesh,
    changing: bool,
    objects: BTreeMap<String, Entry>,
    clouds: BTreeMap<String, Vec<Particle>>,
}

impl InMemoryHost {
    pub fn new(mesh: LocalMesh) -> Self {
        Self {
            time_name: "0".into(),
            mesh,
            ..Self::default()
        }
    }

    pub fn set_time_name(&mut self, time: impl Into<String>) {
        self.time_name = time.into();
    }

    /// Replaces the mesh and marks it as changing for the next write.
    pub fn set_mesh(&mut self, mesh: LocalMesh) {
        self.mesh = mesh;
        self.changing = true;
    }

    pub fn set_mesh_changing(&mut self, changing: bool) {
        self.changing = changing;
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.objects.insert(name.into(), Entry::Scalar(values));
    }

    pub fn insert_vector(&mut self, name: impl Into<String>, values: Vec<[f64; 3]>) {
        self.objects.insert(name.into(), Entry::Vector(values));
    }

    /// Registers an object the exporter can see but not write (tensors, ...).
    pub fn insert_opaque(&mut self, name: impl Into<String>, kind: FieldKind) {
        self.objects.insert(name.into(), Entry::Opaque(kind));
    }

    pub fn remove_object(&mut self, name: &str) {
        self.objects.remove(name);
    }

    pub fn insert_cloud(&mut self, name: impl Into<String>, particles: Vec<Particle>) {
        self.clouds.insert(name.into(), particles);
    }

    pub fn cloud_mut(&mut self, name: &str) -> Option<&mut Vec<Particle>> {
        self.clouds.get_mut(name)
    }
}

impl FieldRegistry for InMemoryHost {
    fn object_names(&self) -> Vec<String> {
        self.objects
            .keys()
            .chain(self.clouds.keys())
            .cloned()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn lookup_field(&self, name: &str) -> FieldLookup<'_> {
        match self.objects.get(name) {
            Some(Entry::Scalar(v)) => FieldLookup::Scalar(v),
            Some(Entry::Vector(v)) => FieldLookup::Vector(v),
            Some(Entry::Opaque(kind)) => FieldLookup::Unsupported(kind),
            None => FieldLookup::NotFound,
        }
    }
}

impl CloudSource for InMemoryHost {
    fn cloud(&self, name: &str) -> Option<&[Particle]> {
        self.clouds.get(name).map(Vec::as_slice)
    }
}

impl SimulationHost for InMemoryHost {
    fn time_name(&self) -> String {
        self.time_name.clone()
    }

    fn mesh(&self) -> &LocalMesh {
        &self.mesh
    }

    fn mesh_changing(&self) -> bool {
        self.changing
    }
}
