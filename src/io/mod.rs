//! Container I/O: on-disk schema, backends, and the collective writers.
//!
//! The writers ([`mesh_writer`], [`field_writer`], [`cloud_writer`]) talk to
//! an open [`container::Container`] and a
//! [`Communicator`](crate::algs::communicator::Communicator). They issue the
//! same create and attribute calls on every rank and transfer only the
//! calling rank's data.

pub mod cloud_writer;
pub mod container;
pub mod field_writer;
pub mod file_ops;
#[cfg(feature = "hdf5-support")]
pub mod hdf5;
pub mod memory;
pub mod mesh_writer;
pub mod schema;
pub mod xdmf;

use crate::IoScalar;

/// Host values converted to the on-disk precision.
pub fn to_io_scalars(values: &[f64]) -> Vec<IoScalar> {
    values.iter().map(|&v| v as IoScalar).collect()
}

/// `[x, y, z]` triples interleaved into one buffer.
pub fn flatten_vectors(values: &[[f64; 3]]) -> Vec<IoScalar> {
    values
        .iter()
        .flat_map(|v| v.iter().map(|&c| c as IoScalar))
        .collect()
}
