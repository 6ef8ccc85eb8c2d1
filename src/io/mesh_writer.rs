//! Mesh writer: per-rank point coordinates and flattened cell streams.
//!
//! Each cell becomes a run `[code, v0, .., vk]` where `code` comes from
//! [`XDMF_SHAPE_CODES`](crate::topology::cell_type::XDMF_SHAPE_CODES). The
//! stream length of every rank is exchanged with an abort sentinel, so an
//! unencodable cell on any rank fails the phase on all ranks before a single
//! mesh dataset exists.

use crate::algs::communicator::Communicator;
use crate::algs::size_exchange::{PartitionLayout, exchange_offsets, exchange_offsets_checked};
use crate::io::container::{Container, DatasetLayout, ElementType, Payload};
use crate::io::flatten_vectors;
use crate::io::schema::{
    ATTR_N_CELLS, CELLS, Category, Owner, POINTS, dataset_path, dataset_shape,
};
use crate::mesh_error::MeshWriteError;
use crate::topology::cell_type::CellType;
use crate::topology::mesh::{Cell, LocalMesh};

/// Sizes of one mesh write, on every rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshCounts {
    pub points: PartitionLayout,
    pub cells: PartitionLayout,
    /// Flattened cell stream lengths.
    pub streams: PartitionLayout,
}

/// Flattens the cells of `mesh` into a typed run-length stream.
pub fn encode_cells(mesh: &LocalMesh) -> Result<Vec<i64>, MeshWriteError> {
    let mut stream = Vec::with_capacity(mesh.n_cells() * 9);
    for (cell_id, cell) in mesh.cells().iter().enumerate() {
        let (code, expected) = match (cell.shape.xdmf_code(), cell.shape.exported_vertex_count())
        {
            (Some(code), Some(n)) => (code, n),
            _ => {
                return Err(MeshWriteError::UnsupportedCellShape {
                    cell: cell_id,
                    shape: cell.shape,
                });
            }
        };
        if cell.vertices.len() != expected {
            return Err(MeshWriteError::CellVertexCount {
                cell: cell_id,
                shape: cell.shape,
                expected,
                found: cell.vertices.len(),
            });
        }
        stream.push(code);
        stream.extend(cell.vertices.iter().map(|&v| v as i64));
    }
    Ok(stream)
}

/// Parses a cell stream holding `n_cells` runs.
pub fn decode_cells(stream: &[i64], n_cells: usize) -> Result<Vec<Cell>, MeshWriteError> {
    let mut cells = Vec::with_capacity(n_cells);
    let mut pos = 0;
    while cells.len() < n_cells {
        let code = *stream.get(pos).ok_or_else(|| {
            MeshWriteError::MalformedCellStream(format!(
                "stream ends after {} of {n_cells} cells",
                cells.len()
            ))
        })?;
        let shape = CellType::from_xdmf_code(code).ok_or_else(|| {
            MeshWriteError::MalformedCellStream(format!("unknown shape code {code} at {pos}"))
        })?;
        let n = shape.exported_vertex_count().unwrap_or(0);
        let run = stream.get(pos + 1..pos + 1 + n).ok_or_else(|| {
            MeshWriteError::MalformedCellStream(format!("truncated cell at {pos}"))
        })?;
        let vertices = run
            .iter()
            .map(|&v| {
                usize::try_from(v).map_err(|_| {
                    MeshWriteError::MalformedCellStream(format!("negative vertex {v} at {pos}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        cells.push(Cell::new(shape, vertices));
        pos += 1 + n;
    }
    if pos != stream.len() {
        return Err(MeshWriteError::MalformedCellStream(format!(
            "{} trailing values after {n_cells} cells",
            stream.len() - pos
        )));
    }
    Ok(cells)
}

/// Writes `MESH/{time}/processor{r}/{POINTS,CELLS}` for every rank.
///
/// Every rank creates all datasets and the `nCells` attributes; only the
/// owning rank writes data into its own pair.
pub fn write_mesh<K, C>(
    container: &mut K,
    comm: &C,
    time: &str,
    mesh: &LocalMesh,
) -> Result<MeshCounts, MeshWriteError>
where
    K: Container,
    C: Communicator,
{
    progress!(comm, "meshWrite");
    let stream = encode_cells(mesh);
    let local_len = stream.as_ref().map(Vec::len).map_err(Clone::clone);
    let streams = exchange_offsets_checked(local_len, comm)?;
    let stream = stream?;
    let points = exchange_offsets(mesh.n_points(), comm)?;
    let cells = exchange_offsets(mesh.n_cells(), comm)?;
    let rank = comm.rank();

    progress!(comm, "meshWritePoints");
    let coords = flatten_vectors(mesh.points());
    for r in 0..comm.size() {
        let path = dataset_path(Category::Mesh, time, Owner::Processor(r), POINTS);
        let layout =
            DatasetLayout::contiguous(ElementType::Float, dataset_shape(points.count(r), 3));
        container.create_dataset(&path, &layout)?;
    }
    let own = dataset_path(Category::Mesh, time, Owner::Processor(rank), POINTS);
    container.write_dataset(&own, Payload::Float(&coords))?;

    progress!(comm, "meshWriteCells");
    for r in 0..comm.size() {
        let path = dataset_path(Category::Mesh, time, Owner::Processor(r), CELLS);
        let layout = DatasetLayout::contiguous(ElementType::Int, vec![streams.count(r)]);
        container.create_dataset(&path, &layout)?;
        container.write_attribute(&path, ATTR_N_CELLS, cells.count(r) as i64)?;
    }
    let own = dataset_path(Category::Mesh, time, Owner::Processor(rank), CELLS);
    container.write_dataset(&own, Payload::Int(&stream))?;

    Ok(MeshCounts {
        points,
        cells,
        streams,
    })
}
