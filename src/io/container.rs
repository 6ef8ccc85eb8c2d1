//! Container abstraction: the collective dataset operations the writers need.
//!
//! Every `create_dataset` and `write_attribute` call is collective: all ranks
//! must issue it in the same order with identical arguments. `write_dataset`
//! and `write_hyperslab` transfer data and may be skipped by ranks that have
//! nothing to contribute.

use crate::IoScalar;
use crate::io::schema::DatasetPath;
use crate::mesh_error::MeshWriteError;
use std::path::Path;

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 64-bit signed integer.
    Int,
    /// Floating point of the configured precision.
    Float,
}

impl ElementType {
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::Int => std::mem::size_of::<i64>(),
            ElementType::Float => std::mem::size_of::<IoScalar>(),
        }
    }

    /// `NumberType` attribute value of an XDMF `DataItem`.
    pub fn xdmf_number_type(self) -> &'static str {
        match self {
            ElementType::Int => "Int",
            ElementType::Float => "Float",
        }
    }
}

/// Shape and storage parameters fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetLayout {
    pub element: ElementType,
    pub shape: Vec<usize>,
    pub chunk: Option<Vec<usize>>,
    /// Deflate level; only honored for chunked datasets.
    pub compression: Option<u8>,
}

impl DatasetLayout {
    pub fn contiguous(element: ElementType, shape: Vec<usize>) -> Self {
        Self {
            element,
            shape,
            chunk: None,
            compression: None,
        }
    }

    pub fn chunked(
        element: ElementType,
        shape: Vec<usize>,
        chunk: Option<Vec<usize>>,
        compression: Option<u8>,
    ) -> Self {
        let compression = chunk.as_ref().and(compression);
        Self {
            element,
            shape,
            chunk,
            compression,
        }
    }

    /// Same layout with the deflate filter removed; chunking is kept.
    pub fn without_compression(self) -> Self {
        Self {
            compression: None,
            ..self
        }
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of values per row.
    pub fn row_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

/// Borrowed data for one write call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Payload<'a> {
    Int(&'a [i64]),
    Float(&'a [IoScalar]),
}

impl Payload<'_> {
    pub fn len(&self) -> usize {
        match self {
            Payload::Int(v) => v.len(),
            Payload::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element(&self) -> ElementType {
        match self {
            Payload::Int(_) => ElementType::Int,
            Payload::Float(_) => ElementType::Float,
        }
    }
}

/// Row selection `[offset, offset + count)` spanning all trailing dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    pub offset: usize,
    pub count: usize,
}

impl Hyperslab {
    pub fn new(offset: usize, count: usize) -> Self {
        Self { offset, count }
    }

    /// Checks the selection against `layout`.
    pub fn check(&self, path: &DatasetPath, layout: &DatasetLayout) -> Result<(), MeshWriteError> {
        let extent = layout.rows();
        if self.offset + self.count > extent {
            return Err(MeshWriteError::HyperslabOutOfBounds {
                path: path.to_string(),
                offset: self.offset,
                count: self.count,
                extent,
            });
        }
        Ok(())
    }
}

/// An open container file shared by all ranks.
pub trait Container {
    /// Collectively creates a dataset; intermediate groups are implied.
    fn create_dataset(
        &mut self,
        path: &DatasetPath,
        layout: &DatasetLayout,
    ) -> Result<(), MeshWriteError>;

    /// Collectively attaches an integer attribute to an existing dataset.
    fn write_attribute(
        &mut self,
        path: &DatasetPath,
        name: &str,
        value: i64,
    ) -> Result<(), MeshWriteError>;

    /// Writes the full extent of a dataset.
    fn write_dataset(&mut self, path: &DatasetPath, data: Payload<'_>)
    -> Result<(), MeshWriteError>;

    /// Writes `data` into the rows selected by `slab`.
    fn write_hyperslab(
        &mut self,
        path: &DatasetPath,
        slab: &Hyperslab,
        data: Payload<'_>,
    ) -> Result<(), MeshWriteError>;

    /// Pushes buffered data to storage.
    fn flush(&mut self) -> Result<(), MeshWriteError>;

    /// Releases the file. Further calls fail with `ContainerClosed`.
    fn close(&mut self) -> Result<(), MeshWriteError>;
}

/// Opens containers for a given rank.
pub trait ContainerFactory {
    type Output: Container;

    fn create(&self, path: &Path) -> Result<Self::Output, MeshWriteError>;

    /// Whether a container already exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Makes sure `dir` can hold new containers.
    fn prepare_dir(&self, dir: &Path) -> Result<(), MeshWriteError> {
        std::fs::create_dir_all(dir)?;
        Ok(())
    }
}

/// Checks payload length and type against a selection of `rows` rows.
pub fn check_payload(
    path: &DatasetPath,
    layout: &DatasetLayout,
    rows: usize,
    data: &Payload<'_>,
) -> Result<(), MeshWriteError> {
    let expected = rows * layout.row_width();
    if data.element() != layout.element {
        return Err(MeshWriteError::CollectiveMismatch {
            path: path.to_string(),
            detail: format!(
                "payload of type {:?} for dataset of type {:?}",
                data.element(),
                layout.element
            ),
        });
    }
    if data.len() != expected {
        return Err(MeshWriteError::PayloadMismatch {
            path: path.to_string(),
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_requires_chunks() {
        let l = DatasetLayout::chunked(ElementType::Float, vec![10], None, Some(4));
        assert_eq!(l.compression, None);
        let l = DatasetLayout::chunked(ElementType::Float, vec![10], Some(vec![5]), Some(4));
        assert_eq!(l.compression, Some(4));
        let l = l.without_compression();
        assert_eq!(l.compression, None);
        assert_eq!(l.chunk, Some(vec![5]));
    }

    #[test]
    fn rows_and_width() {
        let l = DatasetLayout::contiguous(ElementType::Float, vec![7, 3]);
        assert_eq!((l.rows(), l.row_width(), l.element_count()), (7, 3, 21));
        let l = DatasetLayout::contiguous(ElementType::Int, vec![0]);
        assert_eq!((l.rows(), l.row_width(), l.element_count()), (0, 1, 0));
    }

    #[test]
    fn slab_bounds() {
        let path = DatasetPath::from("CLOUDS/c/0/d");
        let l = DatasetLayout::contiguous(ElementType::Float, vec![5]);
        assert!(Hyperslab::new(2, 3).check(&path, &l).is_ok());
        assert!(matches!(
            Hyperslab::new(3, 3).check(&path, &l),
            Err(MeshWriteError::HyperslabOutOfBounds { extent: 5, .. })
        ));
    }

    #[test]
    fn payload_checks() {
        let path = DatasetPath::from("MESH/0/processor0/POINTS");
        let l = DatasetLayout::contiguous(ElementType::Float, vec![2, 3]);
        let data = [0.0 as IoScalar; 6];
        assert!(check_payload(&path, &l, 2, &Payload::Float(&data)).is_ok());
        assert!(matches!(
            check_payload(&path, &l, 2, &Payload::Float(&data[..5])),
            Err(MeshWriteError::PayloadMismatch { expected: 6, found: 5, .. })
        ));
        assert!(matches!(
            check_payload(&path, &l, 1, &Payload::Int(&[0, 0, 0])),
            Err(MeshWriteError::CollectiveMismatch { .. })
        ));
    }
}
