//! Cloud writer: one dataset per requested attribute spanning all ranks'
//! particles, each rank writing its own row range.

use crate::IoScalar;
use crate::algs::communicator::Communicator;
use crate::algs::size_exchange::{PartitionLayout, exchange_offsets_checked};
use crate::host::{CloudSource, Particle};
use crate::io::container::{Container, DatasetLayout, ElementType, Hyperslab, Payload};
use crate::io::schema::{Category, Owner, dataset_path, dataset_shape};
use crate::mesh_error::MeshWriteError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Exportable per-particle quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum CloudAttribute {
    OriginProcessor,
    OriginId,
    Cell,
    CurrentProcessor,
    Position,
    Velocity,
    SlipVelocity,
    Density,
    Diameter,
    Age,
}

impl CloudAttribute {
    /// Every attribute, in the order datasets are created.
    pub const ALL: [CloudAttribute; 10] = [
        CloudAttribute::OriginProcessor,
        CloudAttribute::OriginId,
        CloudAttribute::Cell,
        CloudAttribute::CurrentProcessor,
        CloudAttribute::Position,
        CloudAttribute::Velocity,
        CloudAttribute::SlipVelocity,
        CloudAttribute::Density,
        CloudAttribute::Diameter,
        CloudAttribute::Age,
    ];

    /// Dataset name on disk.
    pub fn dataset_name(self) -> &'static str {
        match self {
            CloudAttribute::OriginProcessor => "origProc",
            CloudAttribute::OriginId => "origId",
            CloudAttribute::Cell => "cell",
            CloudAttribute::CurrentProcessor => "currProc",
            CloudAttribute::Position => "position",
            CloudAttribute::Velocity => "U",
            CloudAttribute::SlipVelocity => "Us",
            CloudAttribute::Density => "rho",
            CloudAttribute::Diameter => "d",
            CloudAttribute::Age => "age",
        }
    }

    /// Configuration keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            CloudAttribute::OriginProcessor => "origin-processor",
            CloudAttribute::OriginId => "origin-id",
            CloudAttribute::Cell => "cell",
            CloudAttribute::CurrentProcessor => "current-processor",
            CloudAttribute::Position => "position",
            CloudAttribute::Velocity => "velocity",
            CloudAttribute::SlipVelocity => "slip-velocity",
            CloudAttribute::Density => "density",
            CloudAttribute::Diameter => "diameter",
            CloudAttribute::Age => "age",
        }
    }

    pub fn components(self) -> usize {
        match self {
            CloudAttribute::Position | CloudAttribute::Velocity | CloudAttribute::SlipVelocity => 3,
            _ => 1,
        }
    }

    pub fn element_type(self) -> ElementType {
        match self {
            CloudAttribute::OriginProcessor
            | CloudAttribute::OriginId
            | CloudAttribute::Cell
            | CloudAttribute::CurrentProcessor => ElementType::Int,
            _ => ElementType::Float,
        }
    }
}

impl fmt::Display for CloudAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for CloudAttribute {
    type Err = MeshWriteError;

    /// Accepts the keyword or the on-disk dataset name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CloudAttribute::ALL
            .into_iter()
            .find(|a| a.keyword() == s || a.dataset_name() == s)
            .ok_or_else(|| MeshWriteError::UnknownCloudAttribute(s.to_owned()))
    }
}

impl TryFrom<String> for CloudAttribute {
    type Error = MeshWriteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Outcome of writing one cloud.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloudWrite {
    Written(PartitionLayout),
    /// No particles on any rank; nothing was created.
    Skipped,
}

enum Column {
    Int(Vec<i64>),
    Float(Vec<IoScalar>),
}

impl Column {
    fn payload(&self) -> Payload<'_> {
        match self {
            Column::Int(v) => Payload::Int(v),
            Column::Float(v) => Payload::Float(v),
        }
    }
}

fn gather_column(attr: CloudAttribute, particles: &[Particle], rank: usize) -> Column {
    let ints = |f: fn(&Particle) -> i64| Column::Int(particles.iter().map(f).collect());
    let floats = |f: fn(&Particle) -> f64| {
        Column::Float(particles.iter().map(|p| f(p) as IoScalar).collect())
    };
    let vectors = |f: fn(&Particle) -> [f64; 3]| {
        Column::Float(
            particles
                .iter()
                .flat_map(|p| f(p))
                .map(|v| v as IoScalar)
                .collect(),
        )
    };
    match attr {
        CloudAttribute::OriginProcessor => ints(|p| p.orig_proc),
        CloudAttribute::OriginId => ints(|p| p.orig_id),
        CloudAttribute::Cell => ints(|p| p.cell),
        CloudAttribute::CurrentProcessor => Column::Int(vec![rank as i64; particles.len()]),
        CloudAttribute::Position => vectors(|p| p.position),
        CloudAttribute::Velocity => vectors(|p| p.velocity),
        CloudAttribute::SlipVelocity => vectors(Particle::slip_velocity),
        CloudAttribute::Density => floats(|p| p.density),
        CloudAttribute::Diameter => floats(|p| p.diameter),
        CloudAttribute::Age => floats(|p| p.age),
    }
}

/// Writes `attributes` of cloud `name` under `CLOUDS/{name}/{time}`.
///
/// Particle counts are exchanged on every call. A cloud with no particles
/// on any rank is skipped without creating anything.
pub fn write_cloud<K, C, S>(
    container: &mut K,
    comm: &C,
    time: &str,
    source: &S,
    name: &str,
    attributes: &[CloudAttribute],
) -> Result<CloudWrite, MeshWriteError>
where
    K: Container,
    C: Communicator,
    S: CloudSource + ?Sized,
{
    progress!(comm, "cloudWrite: {name}");
    let particles = source
        .cloud(name)
        .ok_or_else(|| MeshWriteError::MissingCloud(name.to_owned()));
    let local = particles.as_ref().map(|p| p.len()).map_err(Clone::clone);
    let layout = exchange_offsets_checked(local, comm)?;
    let particles = particles?;

    if layout.total() == 0 {
        progress!(comm, "{name}: No particles in cloud. Skipping write.");
        return Ok(CloudWrite::Skipped);
    }

    let slab = Hyperslab::new(layout.my_offset(), layout.my_count());
    for attr in CloudAttribute::ALL
        .into_iter()
        .filter(|a| attributes.contains(a))
    {
        let path = dataset_path(Category::Clouds, time, Owner::Cloud(name), attr.dataset_name());
        let shape = dataset_shape(layout.total(), attr.components());
        container.create_dataset(&path, &DatasetLayout::contiguous(attr.element_type(), shape))?;
        if layout.my_count() > 0 {
            let column = gather_column(attr, particles, comm.rank());
            container.write_hyperslab(&path, &slab, column.payload())?;
        }
    }
    Ok(CloudWrite::Written(layout))
}
