#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-h5write
//!
//! mesh-h5write exports a distributed mesh, the scalar and vector volume
//! fields defined on it, and particle clouds into a single container file
//! that a post-processing tool can read back without any communication.
//!
//! ## Layout
//! - `MESH/{time}/processor{r}/POINTS` and `CELLS` (with attribute `nCells`)
//! - `FIELDS/{time}/processor{r}/{field}`
//! - `CLOUDS/{cloud}/{time}/{attribute}`
//!
//! Mesh and field data are stored per rank; cloud attributes are single
//! arrays spanning all ranks, each rank writing its own row range at an
//! offset agreed through a size exchange.
//!
//! ## Features
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - In-memory container for testing, HDF5 container behind `hdf5-support`
//!   (and parallel HDF5 through MPI-IO with `hdf5-mpio`)
//! - Optional XDMF descriptors for visualization tools
//! - `single-precision` stores floating-point data as `f32`
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-h5write = "0.1"
//! # features = ["hdf5-mpio"]
//! ```
//!
//! See [`writer::H5Write`] for an end-to-end example.

/// Logs an `info!` line on rank 0 only.
macro_rules! progress {
    ($comm:expr, $($arg:tt)*) => {
        if $comm.rank() == 0 {
            log::info!($($arg)*);
        }
    };
}

pub mod algs;
pub mod classify;
pub mod config;
pub mod host;
pub mod io;
pub mod mesh_error;
pub mod topology;
pub mod writer;

use once_cell::sync::Lazy;
use static_assertions::const_assert;

/// Floating-point type of on-disk data.
#[cfg(feature = "single-precision")]
pub type IoScalar = f32;
/// Floating-point type of on-disk data.
#[cfg(not(feature = "single-precision"))]
pub type IoScalar = f64;

const_assert!(std::mem::size_of::<IoScalar>() == 4 || std::mem::size_of::<IoScalar>() == 8);

static PRECISION: Lazy<usize> = Lazy::new(|| {
    let bytes = std::mem::size_of::<IoScalar>();
    log::debug!("on-disk floating point width: {bytes} bytes");
    bytes
});

/// Width of [`IoScalar`] in bytes.
pub fn precision_bytes() -> usize {
    *PRECISION
}

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::IoScalar;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    pub use crate::algs::size_exchange::{PartitionLayout, exchange_offsets};
    pub use crate::classify::{FieldClassification, classify_fields};
    pub use crate::config::H5WriteConfig;
    pub use crate::host::memory::InMemoryHost;
    pub use crate::host::{
        CloudSource, FieldKind, FieldLookup, FieldRegistry, Particle, SimulationHost,
    };
    pub use crate::io::cloud_writer::CloudAttribute;
    pub use crate::io::container::{Container, ContainerFactory};
    #[cfg(feature = "hdf5-support")]
    pub use crate::io::hdf5::{Hdf5Container, Hdf5Factory};
    pub use crate::io::memory::{MemContainer, MemFactory, MemStore};
    pub use crate::mesh_error::MeshWriteError;
    pub use crate::topology::cell_type::CellType;
    pub use crate::topology::mesh::{Cell, LocalMesh};
    pub use crate::writer::{H5Write, WriteCadence};
}
