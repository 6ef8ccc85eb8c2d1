//! Local (per-rank) mesh partition as seen by the exporter.
//!
//! Point coordinates are dense `[x, y, z]` triples; each cell carries its
//! shape and the local indices of its vertices in shape order.

use crate::topology::cell_type::CellType;

/// One mesh cell: shape plus vertex indices into the local point list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub shape: CellType,
    pub vertices: Vec<usize>,
}

impl Cell {
    pub fn new(shape: CellType, vertices: impl Into<Vec<usize>>) -> Self {
        Self {
            shape,
            vertices: vertices.into(),
        }
    }
}

/// Points and cells owned by one rank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalMesh {
    points: Vec<[f64; 3]>,
    cells: Vec<Cell>,
}

impl LocalMesh {
    pub fn new(points: Vec<[f64; 3]>, cells: Vec<Cell>) -> Self {
        Self { points, cells }
    }

    /// Appends a point and returns its local index.
    pub fn push_point(&mut self, p: [f64; 3]) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    pub fn push_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    #[inline]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }
}
