//! Field writer: one dataset per (time, rank, field).

use crate::algs::communicator::Communicator;
use crate::algs::size_exchange::{PartitionLayout, exchange_offsets_checked};
use crate::classify::FieldClassification;
use crate::host::FieldRegistry;
use crate::io::container::{Container, DatasetLayout, ElementType, Payload};
use crate::io::schema::{ChunkPolicy, Category, Owner, dataset_path, dataset_shape};
use crate::io::{flatten_vectors, to_io_scalars};
use crate::mesh_error::MeshWriteError;

/// Storage parameters shared by all field datasets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldStorage {
    pub chunking: ChunkPolicy,
    pub compression: Option<u8>,
}

impl FieldStorage {
    fn layout(&self, rows: usize, components: usize) -> DatasetLayout {
        let element = ElementType::Float;
        let chunk = self
            .chunking
            .chunk_dims(components, element.byte_width(), rows);
        DatasetLayout::chunked(
            element,
            dataset_shape(rows, components),
            chunk,
            self.compression,
        )
    }
}

/// Checks that every classified field is present and covers the local cells.
fn local_cell_count<R: FieldRegistry + ?Sized>(
    registry: &R,
    fields: &FieldClassification,
    n_cells: usize,
) -> Result<usize, MeshWriteError> {
    let check = |name: &str, len: Option<usize>| match len {
        None => Err(MeshWriteError::MissingField(name.to_owned())),
        Some(found) if found != n_cells => Err(MeshWriteError::FieldLengthMismatch {
            field: name.to_owned(),
            expected: n_cells,
            found,
        }),
        Some(_) => Ok(()),
    };
    for name in &fields.scalar_fields {
        check(name, registry.try_scalar_field(name).map(<[f64]>::len))?;
    }
    for name in &fields.vector_fields {
        check(name, registry.try_vector_field(name).map(<[[f64; 3]]>::len))?;
    }
    Ok(n_cells)
}

/// Writes every classified field under `FIELDS/{time}`.
///
/// A missing or mis-sized field on any rank fails the phase on all ranks
/// before the first field dataset is created.
pub fn write_fields<K, C, R>(
    container: &mut K,
    comm: &C,
    time: &str,
    registry: &R,
    n_cells: usize,
    fields: &FieldClassification,
    storage: &FieldStorage,
) -> Result<PartitionLayout, MeshWriteError>
where
    K: Container,
    C: Communicator,
    R: FieldRegistry + ?Sized,
{
    progress!(comm, "fieldWrite");
    let cells = exchange_offsets_checked(local_cell_count(registry, fields, n_cells), comm)?;

    for name in &fields.scalar_fields {
        progress!(comm, "fieldWriteScalar: {name}");
        let values = registry
            .try_scalar_field(name)
            .ok_or_else(|| MeshWriteError::MissingField(name.clone()))?;
        write_one(container, comm, time, name, &cells, 1, &to_io_scalars(values), storage)?;
    }
    for name in &fields.vector_fields {
        progress!(comm, "fieldWriteVector: {name}");
        let values = registry
            .try_vector_field(name)
            .ok_or_else(|| MeshWriteError::MissingField(name.clone()))?;
        write_one(container, comm, time, name, &cells, 3, &flatten_vectors(values), storage)?;
    }
    Ok(cells)
}

#[allow(clippy::too_many_arguments)]
fn write_one<K, C>(
    container: &mut K,
    comm: &C,
    time: &str,
    name: &str,
    cells: &PartitionLayout,
    components: usize,
    data: &[crate::IoScalar],
    storage: &FieldStorage,
) -> Result<(), MeshWriteError>
where
    K: Container,
    C: Communicator,
{
    for r in 0..comm.size() {
        let path = dataset_path(Category::Fields, time, Owner::Processor(r), name);
        container.create_dataset(&path, &storage.layout(cells.count(r), components))?;
    }
    let own = dataset_path(Category::Fields, time, Owner::Processor(comm.rank()), name);
    container.write_dataset(&own, Payload::Float(data))
}
