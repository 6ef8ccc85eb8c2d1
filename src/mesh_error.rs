//! MeshWriteError: Unified error type for mesh-h5write public APIs
//!
//! Every fallible operation in the crate returns this error. Conditions the
//! host must treat as fatal (unsupported topology, container failures) are
//! reported here rather than by aborting the process.

use crate::topology::cell_type::CellType;
use thiserror::Error;

/// Unified error type for export operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshWriteError {
    /// `writeInterval` must be a positive number of steps.
    #[error("Illegal value for writeInterval {0}. It should be > 0.")]
    InvalidWriteInterval(i64),
    /// A cloud attribute keyword outside the supported set.
    #[error("Unknown cloud attribute `{0}`")]
    UnknownCloudAttribute(String),
    /// An `objectNames` entry that is not a valid pattern.
    #[error("Invalid object name pattern `{pattern}`: {reason}")]
    InvalidObjectPattern { pattern: String, reason: String },
    /// Malformed configuration input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cell whose shape has no visualization encoding.
    #[error("Unsupported or unknown cell type {shape:?} for cell number {cell}")]
    UnsupportedCellShape { cell: usize, shape: CellType },
    /// A cell whose vertex list does not match its shape.
    #[error("Cell {cell} of type {shape:?} expects {expected} vertices, found {found}")]
    CellVertexCount {
        cell: usize,
        shape: CellType,
        expected: usize,
        found: usize,
    },
    /// A cell stream that does not parse back into cells.
    #[error("Malformed cell stream: {0}")]
    MalformedCellStream(String),
    /// Another rank failed while this rank was waiting in a collective phase.
    #[error("Rank {rank} aborted the collective write")]
    RemoteFailure { rank: usize },

    /// A classified field is no longer present in the registry.
    #[error("Field `{0}` not found in the object registry")]
    MissingField(String),
    /// A configured cloud is not present in the registry.
    #[error("Cloud `{0}` not found in the object registry")]
    MissingCloud(String),
    /// Field data does not cover the local cells.
    #[error("Field `{field}` has {found} values but the local mesh has {expected} cells")]
    FieldLengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    /// Point-to-point transfer failed.
    #[error("Communication error with rank {neighbor}: {detail}")]
    CommError { neighbor: usize, detail: String },
    /// A message of unexpected length arrived.
    #[error("Communication error: expected {expected} bytes, got {found}")]
    CommSizeMismatch { expected: usize, found: usize },

    /// A rank issued the same collective create twice.
    #[error("Dataset `{0}` already exists")]
    DatasetExists(String),
    /// Write or attribute on a dataset that was never created.
    #[error("Dataset `{0}` not found")]
    DatasetNotFound(String),
    /// Ranks disagreed on the arguments of a collective call.
    #[error("Collective mismatch on `{path}`: {detail}")]
    CollectiveMismatch { path: String, detail: String },
    /// Buffer length or type does not match the dataset selection.
    #[error("Payload mismatch on `{path}`: expected {expected} elements, got {found}")]
    PayloadMismatch {
        path: String,
        expected: usize,
        found: usize,
    },
    /// Hyperslab selection exceeds the dataset extent.
    #[error("Hyperslab [{offset}, {offset}+{count}) out of bounds for `{path}` with {extent} rows")]
    HyperslabOutOfBounds {
        path: String,
        offset: usize,
        count: usize,
        extent: usize,
    },
    /// Operation on a container after it was closed.
    #[error("Container already closed")]
    ContainerClosed,
    /// Error reported by the HDF5 library.
    #[error("HDF5 error: {0}")]
    Hdf5(String),
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MeshWriteError {
    fn from(err: std::io::Error) -> Self {
        MeshWriteError::Io(err.to_string())
    }
}

impl From<std::fmt::Error> for MeshWriteError {
    fn from(err: std::fmt::Error) -> Self {
        MeshWriteError::Io(err.to_string())
    }
}

#[cfg(feature = "hdf5-support")]
impl From<hdf5::Error> for MeshWriteError {
    fn from(err: hdf5::Error) -> Self {
        MeshWriteError::Hdf5(err.to_string())
    }
}
