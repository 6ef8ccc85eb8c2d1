#![allow(dead_code)]
use mesh_h5write::{
    algs::communicator::ThreadComm,
    host::Particle,
    io::container::ContainerFactory,
    io::memory::{MemContainer, MemFactory},
    mesh_error::MeshWriteError,
    topology::cell_type::CellType,
    topology::mesh::{Cell, LocalMesh},
};
use std::path::Path;

/// Runs `f` on `size` in-process ranks and returns their results in rank order.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let comms = ThreadComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Unit tetrahedron with points shifted by `dx`.
pub fn tet_mesh(dx: f64) -> LocalMesh {
    LocalMesh::new(
        vec![
            [dx, 0.0, 0.0],
            [dx + 1.0, 0.0, 0.0],
            [dx, 1.0, 0.0],
            [dx, 0.0, 1.0],
        ],
        vec![Cell::new(CellType::Tetrahedron, [0, 1, 2, 3])],
    )
}

/// Unit cube split into one hexahedron plus a prism and a pyramid on top.
pub fn mixed_mesh() -> LocalMesh {
    let mut mesh = LocalMesh::default();
    for z in [0.0, 1.0] {
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            mesh.push_point([x, y, z]);
        }
    }
    let apex = mesh.push_point([0.5, 0.5, 2.0]);
    let ridge_a = mesh.push_point([0.0, 0.5, 1.5]);
    let ridge_b = mesh.push_point([1.0, 0.5, 1.5]);
    mesh.push_cell(Cell::new(CellType::Hexahedron, [0, 1, 2, 3, 4, 5, 6, 7]));
    mesh.push_cell(Cell::new(CellType::Pyramid, [4, 5, 6, 7, apex]));
    mesh.push_cell(Cell::new(CellType::Prism, [4, 7, ridge_a, 5, 6, ridge_b]));
    mesh
}

pub fn particle(orig_proc: i64, orig_id: i64) -> Particle {
    Particle {
        orig_proc,
        orig_id,
        cell: 0,
        position: [orig_id as f64, orig_proc as f64, 0.5],
        velocity: [1.0, 0.0, 0.0],
        carrier_velocity: [0.5, 0.0, 0.0],
        density: 998.0,
        diameter: 1e-5,
        age: orig_id as f64 * 0.1,
    }
}

/// In-memory containers whose file names are also reserved on disk, so the
/// filesystem probing of the default factory methods is exercised.
#[derive(Clone, Debug)]
pub struct DiskBacked(pub MemFactory);

impl ContainerFactory for DiskBacked {
    type Output = MemContainer;

    fn create(&self, path: &Path) -> Result<MemContainer, MeshWriteError> {
        if !path.exists() {
            std::fs::File::create(path)?;
        }
        self.0.create(path)
    }
}
