//! Host simulation interfaces.
//!
//! The exporter never owns simulation state. At each write it queries the
//! host for the current time label, the local mesh, named volume fields and
//! particle clouds through the traits below. Field lookup is an explicit
//! capability query returning a tagged result instead of a runtime type probe.

pub mod memory;

use crate::topology::mesh::LocalMesh;

/// Kind of a registered volume field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vector,
    SphericalTensor,
    SymmTensor,
    Tensor,
    /// Registered object of a type the exporter does not know.
    Other(String),
}

impl FieldKind {
    /// Tensor-family fields are recognized but never exported.
    pub fn is_tensor(&self) -> bool {
        matches!(
            self,
            FieldKind::SphericalTensor | FieldKind::SymmTensor | FieldKind::Tensor
        )
    }
}

/// Result of looking a name up in the registry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldLookup<'a> {
    Scalar(&'a [f64]),
    Vector(&'a [[f64; 3]]),
    /// Present, but of a kind that has no export path.
    Unsupported(&'a FieldKind),
    NotFound,
}

/// Named object registry of the host.
pub trait FieldRegistry {
    /// All registered object names, sorted.
    fn object_names(&self) -> Vec<String>;

    fn lookup_field(&self, name: &str) -> FieldLookup<'_>;

    fn try_scalar_field(&self, name: &str) -> Option<&[f64]> {
        match self.lookup_field(name) {
            FieldLookup::Scalar(values) => Some(values),
            _ => None,
        }
    }

    fn try_vector_field(&self, name: &str) -> Option<&[[f64; 3]]> {
        match self.lookup_field(name) {
            FieldLookup::Vector(values) => Some(values),
            _ => None,
        }
    }
}

/// One particle record of a cloud.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    /// Rank on which the particle was injected.
    pub orig_proc: i64,
    /// Id of the particle on its originating rank.
    pub orig_id: i64,
    /// Local index of the cell containing the particle.
    pub cell: i64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    /// Carrier-phase velocity seen by the particle.
    pub carrier_velocity: [f64; 3],
    pub density: f64,
    pub diameter: f64,
    pub age: f64,
}

impl Particle {
    /// Particle velocity relative to the carrier phase.
    pub fn slip_velocity(&self) -> [f64; 3] {
        [
            self.velocity[0] - self.carrier_velocity[0],
            self.velocity[1] - self.carrier_velocity[1],
            self.velocity[2] - self.carrier_velocity[2],
        ]
    }
}

/// Particle clouds of the host.
pub trait CloudSource {
    /// Particles of `name` currently living on this rank.
    fn cloud(&self, name: &str) -> Option<&[Particle]>;
}

/// Everything the exporter reads from the simulation at write time.
pub trait SimulationHost: FieldRegistry + CloudSource {
    /// Current simulation time formatted as the grouping label.
    fn time_name(&self) -> String;

    fn mesh(&self) -> &LocalMesh;

    /// `true` when the topology changed since the previous step.
    fn mesh_changing(&self) -> bool {
        false
    }
}
