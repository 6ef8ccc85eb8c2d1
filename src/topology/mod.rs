//! Mesh topology as handed over by the host: cell shapes and the local partition.

pub mod cell_type;
pub mod mesh;
