//! Cell type metadata for mesh cells.
//!
//! Only the four primitive volume shapes have an encoding in the exported
//! cell stream; every other shape is rejected by the mesh writer.

/// Common cell types for mesh elements.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CellType {
    /// 0D vertex.
    #[default]
    Vertex,
    /// 1D segment/edge.
    Segment,
    /// 2D simplex (triangle).
    Triangle,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D pyramid.
    Pyramid,
    /// 3D wedge/prism.
    Prism,
    /// 3D tensor-product cell (hex).
    Hexahedron,
    /// 3D tet-wedge and other degenerate shapes.
    TetWedge,
    /// Generic polyhedron.
    Polyhedron,
}

/// Shape codes understood by XDMF `Mixed` topologies, with the vertex count
/// that follows each code in the flattened stream.
pub const XDMF_SHAPE_CODES: [(CellType, i64, usize); 4] = [
    (CellType::Tetrahedron, 6, 4),
    (CellType::Pyramid, 7, 5),
    (CellType::Prism, 8, 6),
    (CellType::Hexahedron, 9, 8),
];

impl CellType {
    /// XDMF shape code, or `None` when the shape cannot be exported.
    pub fn xdmf_code(self) -> Option<i64> {
        XDMF_SHAPE_CODES
            .iter()
            .find(|(shape, _, _)| *shape == self)
            .map(|&(_, code, _)| code)
    }

    /// Number of vertices that follow the shape code.
    pub fn exported_vertex_count(self) -> Option<usize> {
        XDMF_SHAPE_CODES
            .iter()
            .find(|(shape, _, _)| *shape == self)
            .map(|&(_, _, n)| n)
    }

    /// Inverse of [`CellType::xdmf_code`].
    pub fn from_xdmf_code(code: i64) -> Option<CellType> {
        XDMF_SHAPE_CODES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|&(shape, _, _)| shape)
    }
}
