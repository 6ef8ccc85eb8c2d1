//! HDF5 container backend.
//!
//! With `hdf5-mpio` the file is opened through the MPI-IO driver on the
//! communicator of an [`MpiComm`](crate::algs::communicator::MpiComm); all
//! group, dataset and attribute creation is then collective. Without it the
//! backend is only usable from a single rank.
//!
//! Field and mesh data are written by their owning rank alone, which parallel
//! HDF5 does not allow on filtered datasets. Files opened through MPI-IO
//! therefore store chunked datasets uncompressed.

use crate::IoScalar;
use crate::io::container::{
    Container, ContainerFactory, DatasetLayout, ElementType, Hyperslab, Payload, check_payload,
};
use crate::io::schema::DatasetPath;
use crate::mesh_error::MeshWriteError;
use hdf5::{Dataset, File, Group, H5Type};
use ndarray::{ArrayView2, s};
use std::path::Path;

/// Opens [`Hdf5Container`]s.
#[derive(Clone, Debug, Default)]
pub struct Hdf5Factory {
    #[cfg(feature = "hdf5-mpio")]
    comm: Option<mpi::ffi::MPI_Comm>,
}

impl Hdf5Factory {
    /// Factory for serial access.
    pub fn serial() -> Self {
        Self::default()
    }

    /// Factory opening files collectively on `comm`.
    #[cfg(feature = "hdf5-mpio")]
    pub fn mpio(comm: &crate::algs::communicator::MpiComm) -> Self {
        use mpi::raw::AsRaw;
        Self {
            comm: Some(comm.world.as_raw()),
        }
    }
}

impl ContainerFactory for Hdf5Factory {
    type Output = Hdf5Container;

    fn create(&self, path: &Path) -> Result<Hdf5Container, MeshWriteError> {
        #[cfg(feature = "hdf5-mpio")]
        let file = match self.comm {
            Some(comm) => hdf5::FileBuilder::new()
                .with_fapl(|p| p.mpio(comm, None))
                .create(path)?,
            None => File::create(path)?,
        };
        #[cfg(not(feature = "hdf5-mpio"))]
        let file = File::create(path)?;
        #[cfg(feature = "hdf5-mpio")]
        let parallel = self.comm.is_some();
        #[cfg(not(feature = "hdf5-mpio"))]
        let parallel = false;
        log::debug!("opened {} (parallel: {parallel})", path.display());
        Ok(Hdf5Container {
            file: Some(file),
            parallel,
            warned_compression: false,
        })
    }
}

/// An open HDF5 file.
#[derive(Debug)]
pub struct Hdf5Container {
    file: Option<File>,
    /// Opened through MPI-IO.
    parallel: bool,
    warned_compression: bool,
}

impl Hdf5Container {
    fn file(&self) -> Result<&File, MeshWriteError> {
        self.file.as_ref().ok_or(MeshWriteError::ContainerClosed)
    }

    fn dataset(&self, path: &DatasetPath) -> Result<Dataset, MeshWriteError> {
        self.file()?
            .dataset(path.as_str())
            .map_err(|_| MeshWriteError::DatasetNotFound(path.to_string()))
    }

    /// Layout actually stored: compression is dropped on MPI-IO files.
    fn storage_layout(&mut self, layout: &DatasetLayout) -> DatasetLayout {
        if !self.parallel || layout.compression.is_none() {
            return layout.clone();
        }
        if !self.warned_compression {
            log::warn!(
                "compression is not supported for independent writes through MPI-IO; \
                 datasets are stored uncompressed"
            );
            self.warned_compression = true;
        }
        layout.clone().without_compression()
    }

    /// Opens or creates every group on the way to `path`'s parent.
    fn parent_group(&self, path: &DatasetPath) -> Result<Group, MeshWriteError> {
        let mut group: Group = (**self.file()?).clone();
        if let Some(parent) = path.parent() {
            for name in parent.split('/').filter(|c| !c.is_empty()) {
                group = if group.link_exists(name) {
                    group.group(name)?
                } else {
                    group.create_group(name)?
                };
            }
        }
        Ok(group)
    }
}

fn build_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    layout: &DatasetLayout,
) -> Result<Dataset, MeshWriteError> {
    let mut builder = group.new_dataset::<T>().shape(layout.shape.clone());
    if let Some(chunk) = &layout.chunk {
        builder = builder.chunk(chunk.clone());
        if let Some(level) = layout.compression {
            builder = builder.deflate(level);
        }
    }
    Ok(builder.create(name)?)
}

fn write_rows<T: H5Type>(
    ds: &Dataset,
    layout: &DatasetLayout,
    slab: &Hyperslab,
    data: &[T],
) -> Result<(), MeshWriteError> {
    let end = slab.offset + slab.count;
    if layout.shape.len() == 1 {
        ds.write_slice(data, s![slab.offset..end])?;
    } else {
        let view = ArrayView2::from_shape((slab.count, layout.row_width()), data)
            .map_err(|e| MeshWriteError::Hdf5(e.to_string()))?;
        ds.write_slice(view, s![slab.offset..end, ..])?;
    }
    Ok(())
}

fn layout_of(path: &DatasetPath, ds: &Dataset) -> Result<DatasetLayout, MeshWriteError> {
    let dtype = ds.dtype()?;
    let element = if dtype.is::<i64>() {
        ElementType::Int
    } else if dtype.is::<IoScalar>() {
        ElementType::Float
    } else {
        return Err(MeshWriteError::CollectiveMismatch {
            path: path.to_string(),
            detail: format!("unexpected element size {}", dtype.size()),
        });
    };
    Ok(DatasetLayout::contiguous(element, ds.shape()))
}

impl Container for Hdf5Container {
    fn create_dataset(
        &mut self,
        path: &DatasetPath,
        layout: &DatasetLayout,
    ) -> Result<(), MeshWriteError> {
        let layout = self.storage_layout(layout);
        let group = self.parent_group(path)?;
        if group.link_exists(path.name()) {
            return Err(MeshWriteError::DatasetExists(path.to_string()));
        }
        match layout.element {
            ElementType::Int => build_dataset::<i64>(&group, path.name(), &layout)?,
            ElementType::Float => build_dataset::<IoScalar>(&group, path.name(), &layout)?,
        };
        log::debug!("created {path} {:?}", layout.shape);
        Ok(())
    }

    fn write_attribute(
        &mut self,
        path: &DatasetPath,
        name: &str,
        value: i64,
    ) -> Result<(), MeshWriteError> {
        let ds = self.dataset(path)?;
        ds.new_attr::<i64>()
            .shape(1)
            .create(name)?
            .write_raw(&[value])?;
        Ok(())
    }

    fn write_dataset(
        &mut self,
        path: &DatasetPath,
        data: Payload<'_>,
    ) -> Result<(), MeshWriteError> {
        let ds = self.dataset(path)?;
        let layout = layout_of(path, &ds)?;
        check_payload(path, &layout, layout.rows(), &data)?;
        if data.is_empty() {
            return Ok(());
        }
        match data {
            Payload::Int(v) => ds.write_raw(v)?,
            Payload::Float(v) => ds.write_raw(v)?,
        }
        Ok(())
    }

    fn write_hyperslab(
        &mut self,
        path: &DatasetPath,
        slab: &Hyperslab,
        data: Payload<'_>,
    ) -> Result<(), MeshWriteError> {
        let ds = self.dataset(path)?;
        let layout = layout_of(path, &ds)?;
        slab.check(path, &layout)?;
        check_payload(path, &layout, slab.count, &data)?;
        if slab.count == 0 {
            return Ok(());
        }
        match data {
            Payload::Int(v) => write_rows(&ds, &layout, slab, v),
            Payload::Float(v) => write_rows(&ds, &layout, slab, v),
        }
    }

    fn flush(&mut self) -> Result<(), MeshWriteError> {
        self.file()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), MeshWriteError> {
        let file = self.file.take().ok_or(MeshWriteError::ContainerClosed)?;
        file.flush()?;
        file.close()?;
        Ok(())
    }
}
