//! On-disk layout: dataset paths, shapes and chunking parameters.
//!
//! ```text
//! MESH/{time}/processor{r}/POINTS        (nPoints[r], 3)   float
//! MESH/{time}/processor{r}/CELLS         (streamLen[r])    int, attr nCells
//! FIELDS/{time}/processor{r}/{field}     (nCells[r]) | (nCells[r], 3)
//! CLOUDS/{cloud}/{time}/{attribute}      (nTotal) | (nTotal, 3)
//! ```

use serde::Deserialize;
use std::fmt;

/// Dataset holding point coordinates of one rank.
pub const POINTS: &str = "POINTS";
/// Dataset holding the flattened cell stream of one rank.
pub const CELLS: &str = "CELLS";
/// Attribute on [`CELLS`] with the logical number of cells.
pub const ATTR_N_CELLS: &str = "nCells";

/// Top-level group of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Mesh,
    Fields,
    Clouds,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Mesh => "MESH",
            Category::Fields => "FIELDS",
            Category::Clouds => "CLOUDS",
        }
    }
}

/// Who a dataset belongs to below the category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner<'a> {
    /// Per-rank shard (mesh and fields).
    Processor(usize),
    /// Whole-cloud array spanning all ranks.
    Cloud(&'a str),
}

/// Full slash-separated dataset path, without a leading slash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetPath(String);

impl DatasetPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path components, outermost group first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Enclosing group, if any.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }

    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map_or(&self.0, |(_, name)| name)
    }
}

impl fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetPath {
    fn from(s: &str) -> Self {
        DatasetPath(s.trim_start_matches('/').to_owned())
    }
}

/// Builds the path of a dataset.
///
/// Per-rank owners live below the time label, clouds above it.
pub fn dataset_path(category: Category, time: &str, owner: Owner<'_>, name: &str) -> DatasetPath {
    let cat = category.as_str();
    match owner {
        Owner::Processor(rank) => DatasetPath(format!("{cat}/{time}/processor{rank}/{name}")),
        Owner::Cloud(cloud) => DatasetPath(format!("{cat}/{cloud}/{time}/{name}")),
    }
}

/// `[total]` for single-component data, `[total, components]` otherwise.
pub fn dataset_shape(total: usize, components: usize) -> Vec<usize> {
    if components <= 1 {
        vec![total]
    } else {
        vec![total, components]
    }
}

/// Chunking policy for chunked datasets.
///
/// Datasets below `min_chunk_elements` rows are stored contiguously. Larger
/// ones get row chunks of roughly `target_chunk_bytes`, never exceeding the
/// dataset extent.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkPolicy {
    pub min_chunk_elements: usize,
    pub target_chunk_bytes: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_chunk_elements: 1024,
            target_chunk_bytes: 1 << 20,
        }
    }
}

impl ChunkPolicy {
    /// Chunk dimensions for a dataset of `total` rows of `components` values
    /// of `element_bytes` each, or `None` for contiguous storage.
    pub fn chunk_dims(
        &self,
        components: usize,
        element_bytes: usize,
        total: usize,
    ) -> Option<Vec<usize>> {
        if total == 0 || total < self.min_chunk_elements {
            return None;
        }
        let row_bytes = components.max(1) * element_bytes.max(1);
        let rows = (self.target_chunk_bytes / row_bytes).clamp(1, total);
        Some(dataset_shape(rows, components))
    }
}
