//! In-process container backend.
//!
//! A [`MemStore`] is shared by every rank of a [`ThreadComm`] world; each rank
//! opens its own [`MemContainer`] view on it. The store records which ranks
//! issued each collective call and with which arguments, so a test can check
//! afterwards that all ranks issued matching creates and attributes.
//!
//! [`ThreadComm`]: crate::algs::communicator::ThreadComm

use crate::IoScalar;
use crate::io::container::{
    Container, ContainerFactory, DatasetLayout, ElementType, Hyperslab, Payload, check_payload,
};
use crate::io::schema::DatasetPath;
use crate::mesh_error::MeshWriteError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
enum Values {
    Int(Vec<i64>),
    Float(Vec<IoScalar>),
}

impl Values {
    fn zeroed(layout: &DatasetLayout) -> Self {
        let n = layout.element_count();
        match layout.element {
            ElementType::Int => Values::Int(vec![0; n]),
            ElementType::Float => Values::Float(vec![0.0; n]),
        }
    }

    fn store(&mut self, start: usize, data: Payload<'_>) {
        match (self, data) {
            (Values::Int(dst), Payload::Int(src)) => {
                dst[start..start + src.len()].copy_from_slice(src)
            }
            (Values::Float(dst), Payload::Float(src)) => {
                dst[start..start + src.len()].copy_from_slice(src)
            }
            // rejected by check_payload
            _ => {}
        }
    }
}

#[derive(Debug)]
struct MemDataset {
    layout: DatasetLayout,
    creators: BTreeSet<usize>,
    attributes: BTreeMap<String, BTreeMap<usize, i64>>,
    values: Values,
}

#[derive(Debug, Default)]
struct MemFile {
    datasets: BTreeMap<DatasetPath, MemDataset>,
    /// Collective calls in issue order, per rank.
    calls: BTreeMap<usize, Vec<String>>,
    flushes: BTreeMap<usize, usize>,
    open: BTreeSet<usize>,
    closed: BTreeSet<usize>,
}

/// Shared in-memory storage for any number of container files.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    files: Arc<Mutex<BTreeMap<PathBuf, MemFile>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory opening files of this store as `rank`.
    pub fn factory(&self, rank: usize) -> MemFactory {
        MemFactory {
            store: self.clone(),
            rank,
        }
    }

    pub fn file_names(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    pub fn contains_file(&self, file: &Path) -> bool {
        self.files.lock().contains_key(file)
    }

    /// All dataset paths of `file`, sorted.
    pub fn dataset_paths(&self, file: &Path) -> Vec<String> {
        self.files
            .lock()
            .get(file)
            .map(|f| f.datasets.keys().map(|p| p.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn layout(&self, file: &Path, path: &str) -> Option<DatasetLayout> {
        self.with_dataset(file, path, |ds| ds.layout.clone())
    }

    pub fn shape(&self, file: &Path, path: &str) -> Option<Vec<usize>> {
        self.with_dataset(file, path, |ds| ds.layout.shape.clone())
    }

    pub fn read_ints(&self, file: &Path, path: &str) -> Option<Vec<i64>> {
        self.with_dataset(file, path, |ds| match &ds.values {
            Values::Int(v) => Some(v.clone()),
            Values::Float(_) => None,
        })
        .flatten()
    }

    pub fn read_floats(&self, file: &Path, path: &str) -> Option<Vec<IoScalar>> {
        self.with_dataset(file, path, |ds| match &ds.values {
            Values::Float(v) => Some(v.clone()),
            Values::Int(_) => None,
        })
        .flatten()
    }

    /// Attribute value, if every rank that wrote it agreed.
    pub fn attribute(&self, file: &Path, path: &str, name: &str) -> Option<i64> {
        self.with_dataset(file, path, |ds| {
            let per_rank = ds.attributes.get(name)?;
            let mut values = per_rank.values();
            let first = *values.next()?;
            values.all(|&v| v == first).then_some(first)
        })
        .flatten()
    }

    /// Flushes issued by rank 0 on `file`.
    pub fn flush_count(&self, file: &Path) -> usize {
        self.files
            .lock()
            .get(file)
            .and_then(|f| f.flushes.get(&0).copied())
            .unwrap_or(0)
    }

    /// `true` once every rank that opened `file` closed it.
    pub fn is_closed(&self, file: &Path) -> bool {
        self.files
            .lock()
            .get(file)
            .is_some_and(|f| !f.open.is_empty() && f.open == f.closed)
    }

    /// Checks that every rank issued the same collective calls in the same
    /// order and created every dataset.
    pub fn verify_collectives(&self, file: &Path) -> Result<(), MeshWriteError> {
        let files = self.files.lock();
        let Some(f) = files.get(file) else {
            return Err(MeshWriteError::Io(format!(
                "no file {} in store",
                file.display()
            )));
        };
        let mut sequences = f.calls.iter();
        if let Some((&first_rank, first)) = sequences.next() {
            for (&rank, calls) in sequences {
                if let Some(i) = (0..first.len().max(calls.len()))
                    .find(|&i| first.get(i) != calls.get(i))
                {
                    return Err(MeshWriteError::CollectiveMismatch {
                        path: file.display().to_string(),
                        detail: format!(
                            "call {i}: rank {first_rank} issued {:?}, rank {rank} issued {:?}",
                            first.get(i),
                            calls.get(i)
                        ),
                    });
                }
            }
        }
        for (path, ds) in &f.datasets {
            if ds.creators != f.open {
                return Err(MeshWriteError::CollectiveMismatch {
                    path: path.to_string(),
                    detail: format!(
                        "created by ranks {:?}, file opened by {:?}",
                        ds.creators, f.open
                    ),
                });
            }
        }
        Ok(())
    }

    fn with_dataset<T>(
        &self,
        file: &Path,
        path: &str,
        f: impl FnOnce(&MemDataset) -> T,
    ) -> Option<T> {
        let files = self.files.lock();
        files
            .get(file)?
            .datasets
            .get(&DatasetPath::from(path))
            .map(f)
    }
}

/// Opens [`MemContainer`]s on a shared [`MemStore`].
#[derive(Clone, Debug)]
pub struct MemFactory {
    store: MemStore,
    rank: usize,
}

impl ContainerFactory for MemFactory {
    type Output = MemContainer;

    fn create(&self, path: &Path) -> Result<MemContainer, MeshWriteError> {
        let mut files = self.store.files.lock();
        let file = files.entry(path.to_path_buf()).or_default();
        if !file.open.insert(self.rank) {
            return Err(MeshWriteError::Io(format!(
                "rank {} opened {} twice",
                self.rank,
                path.display()
            )));
        }
        Ok(MemContainer {
            store: self.store.clone(),
            file: path.to_path_buf(),
            rank: self.rank,
            closed: false,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.store.contains_file(path)
    }

    fn prepare_dir(&self, _dir: &Path) -> Result<(), MeshWriteError> {
        Ok(())
    }
}

/// One rank's handle on a file of a [`MemStore`].
#[derive(Debug)]
pub struct MemContainer {
    store: MemStore,
    file: PathBuf,
    rank: usize,
    closed: bool,
}

impl MemContainer {
    pub fn file(&self) -> &Path {
        &self.file
    }

    fn with_file<T>(
        &mut self,
        f: impl FnOnce(&mut MemFile, usize) -> Result<T, MeshWriteError>,
    ) -> Result<T, MeshWriteError> {
        if self.closed {
            return Err(MeshWriteError::ContainerClosed);
        }
        let mut files = self.store.files.lock();
        let file = files
            .get_mut(&self.file)
            .ok_or_else(|| MeshWriteError::Io(format!("{} vanished", self.file.display())))?;
        f(file, self.rank)
    }
}

fn created_dataset<'a>(
    file: &'a mut MemFile,
    path: &DatasetPath,
    rank: usize,
) -> Result<&'a mut MemDataset, MeshWriteError> {
    file.datasets
        .get_mut(path)
        .filter(|ds| ds.creators.contains(&rank))
        .ok_or_else(|| MeshWriteError::DatasetNotFound(path.to_string()))
}

impl Container for MemContainer {
    fn create_dataset(
        &mut self,
        path: &DatasetPath,
        layout: &DatasetLayout,
    ) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            file.calls
                .entry(rank)
                .or_default()
                .push(format!("create {path} {layout:?}"));
            match file.datasets.get_mut(path) {
                Some(ds) => {
                    if ds.layout != *layout {
                        return Err(MeshWriteError::CollectiveMismatch {
                            path: path.to_string(),
                            detail: format!("layout {:?} vs {:?}", ds.layout, layout),
                        });
                    }
                    if !ds.creators.insert(rank) {
                        return Err(MeshWriteError::DatasetExists(path.to_string()));
                    }
                }
                None => {
                    file.datasets.insert(
                        path.clone(),
                        MemDataset {
                            layout: layout.clone(),
                            creators: BTreeSet::from([rank]),
                            attributes: BTreeMap::new(),
                            values: Values::zeroed(layout),
                        },
                    );
                }
            }
            log::debug!("rank {rank}: created {path} {:?}", layout.shape);
            Ok(())
        })
    }

    fn write_attribute(
        &mut self,
        path: &DatasetPath,
        name: &str,
        value: i64,
    ) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            file.calls
                .entry(rank)
                .or_default()
                .push(format!("attr {path} {name}={value}"));
            let ds = created_dataset(file, path, rank)?;
            ds.attributes
                .entry(name.to_owned())
                .or_default()
                .insert(rank, value);
            Ok(())
        })
    }

    fn write_dataset(
        &mut self,
        path: &DatasetPath,
        data: Payload<'_>,
    ) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            let ds = created_dataset(file, path, rank)?;
            check_payload(path, &ds.layout, ds.layout.rows(), &data)?;
            ds.values.store(0, data);
            Ok(())
        })
    }

    fn write_hyperslab(
        &mut self,
        path: &DatasetPath,
        slab: &Hyperslab,
        data: Payload<'_>,
    ) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            let ds = created_dataset(file, path, rank)?;
            slab.check(path, &ds.layout)?;
            check_payload(path, &ds.layout, slab.count, &data)?;
            let start = slab.offset * ds.layout.row_width();
            ds.values.store(start, data);
            Ok(())
        })
    }

    fn flush(&mut self) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            *file.flushes.entry(rank).or_default() += 1;
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), MeshWriteError> {
        self.with_file(|file, rank| {
            file.closed.insert(rank);
            Ok(())
        })?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> DatasetPath {
        DatasetPath::from(s)
    }

    #[test]
    fn create_write_read_back() {
        let store = MemStore::new();
        let file = Path::new("out/h5Data0.h5");
        let mut c = store.factory(0).create(file).unwrap();
        let layout = DatasetLayout::contiguous(ElementType::Int, vec![4]);
        c.create_dataset(&path("MESH/0/processor0/CELLS"), &layout)
            .unwrap();
        c.write_attribute(&path("MESH/0/processor0/CELLS"), "nCells", 1)
            .unwrap();
        c.write_dataset(&path("MESH/0/processor0/CELLS"), Payload::Int(&[6, 0, 1, 2]))
            .unwrap();
        c.flush().unwrap();
        c.close().unwrap();

        let p = "MESH/0/processor0/CELLS";
        assert_eq!(store.read_ints(file, p), Some(vec![6, 0, 1, 2]));
        assert_eq!(store.read_floats(file, p), None);
        assert_eq!(store.attribute(file, p, "nCells"), Some(1));
        assert_eq!(store.flush_count(file), 1);
        assert!(store.is_closed(file));
        assert!(store.verify_collectives(file).is_ok());
    }

    #[test]
    fn mismatched_layouts_are_rejected() {
        let store = MemStore::new();
        let file = Path::new("f.h5");
        let mut a = store.factory(0).create(file).unwrap();
        let mut b = store.factory(1).create(file).unwrap();
        let p = path("FIELDS/0/processor0/p");
        a.create_dataset(&p, &DatasetLayout::contiguous(ElementType::Float, vec![3]))
            .unwrap();
        let err = b
            .create_dataset(&p, &DatasetLayout::contiguous(ElementType::Float, vec![4]))
            .unwrap_err();
        assert!(matches!(err, MeshWriteError::CollectiveMismatch { .. }));
    }

    #[test]
    fn duplicate_create_and_missing_create() {
        let store = MemStore::new();
        let file = Path::new("f.h5");
        let mut a = store.factory(0).create(file).unwrap();
        let mut b = store.factory(1).create(file).unwrap();
        let p = path("CLOUDS/c/0/d");
        let layout = DatasetLayout::contiguous(ElementType::Float, vec![2]);
        a.create_dataset(&p, &layout).unwrap();
        assert_eq!(
            a.create_dataset(&p, &layout),
            Err(MeshWriteError::DatasetExists(p.to_string()))
        );
        // rank 1 never created it
        assert_eq!(
            b.write_dataset(&p, Payload::Float(&[1.0, 2.0])),
            Err(MeshWriteError::DatasetNotFound(p.to_string()))
        );
        assert!(store.verify_collectives(file).is_err());
    }

    #[test]
    fn hyperslabs_land_at_offsets() {
        let store = MemStore::new();
        let file = Path::new("f.h5");
        let mut c = store.factory(0).create(file).unwrap();
        let p = path("CLOUDS/c/0/position");
        c.create_dataset(&p, &DatasetLayout::contiguous(ElementType::Float, vec![3, 3]))
            .unwrap();
        c.write_hyperslab(&p, &Hyperslab::new(1, 2), Payload::Float(&[1.0; 6]))
            .unwrap();
        assert_eq!(
            store.read_floats(file, p.as_str()).unwrap(),
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        );
        assert!(c
            .write_hyperslab(&p, &Hyperslab::new(2, 2), Payload::Float(&[1.0; 6]))
            .is_err());
    }

    #[test]
    fn closed_container_refuses_calls() {
        let store = MemStore::new();
        let mut c = store.factory(0).create(Path::new("f.h5")).unwrap();
        c.close().unwrap();
        assert_eq!(c.flush(), Err(MeshWriteError::ContainerClosed));
    }

    #[test]
    fn divergent_call_order_is_detected() {
        let store = MemStore::new();
        let file = Path::new("f.h5");
        let mut a = store.factory(0).create(file).unwrap();
        let mut b = store.factory(1).create(file).unwrap();
        let layout = DatasetLayout::contiguous(ElementType::Float, vec![1]);
        a.create_dataset(&path("A/x"), &layout).unwrap();
        a.create_dataset(&path("A/y"), &layout).unwrap();
        b.create_dataset(&path("A/y"), &layout).unwrap();
        b.create_dataset(&path("A/x"), &layout).unwrap();
        assert!(matches!(
            store.verify_collectives(file),
            Err(MeshWriteError::CollectiveMismatch { .. })
        ));
    }
}
