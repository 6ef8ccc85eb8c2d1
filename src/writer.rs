//! Write orchestrator: cadence, mesh/field/cloud sequencing, file lifecycle.
//!
//! # Example
//! ```
//! use mesh_h5write::prelude::*;
//!
//! let mut mesh = LocalMesh::default();
//! for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
//!     mesh.push_point(p);
//! }
//! mesh.push_cell(Cell::new(CellType::Tetrahedron, [0, 1, 2, 3]));
//! let mut host = InMemoryHost::new(mesh);
//! host.insert_scalar("p", vec![101325.0]);
//!
//! let store = MemStore::new();
//! let config = H5WriteConfig::new(2).with_objects(["p"]);
//! let mut writer = H5Write::new(config, &host, NoComm, &store.factory(0))?;
//! host.set_time_name("0.1");
//! assert!(!writer.write(&host)?);
//! host.set_time_name("0.2");
//! assert!(writer.write(&host)?);
//! let file = writer.close()?;
//! assert!(store.dataset_paths(&file).contains(&"FIELDS/0.2/processor0/p".to_string()));
//! # Ok::<(), MeshWriteError>(())
//! ```

use crate::algs::communicator::Communicator;
use crate::classify::{FieldClassification, classify_fields};
use crate::config::H5WriteConfig;
use crate::host::SimulationHost;
use crate::io::cloud_writer::{CloudAttribute, CloudWrite, write_cloud};
use crate::io::container::{Container, ContainerFactory};
use crate::io::field_writer::{FieldStorage, write_fields};
use crate::io::file_ops::{close_container, open_container};
use crate::io::mesh_writer::write_mesh;
use crate::io::xdmf::XdmfManifest;
use crate::mesh_error::MeshWriteError;
use std::path::{Path, PathBuf};

/// Step counter deciding which calls write.
///
/// Writes happen at steps `0, k, 2k, ..` for interval `k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteCadence {
    time_steps: u64,
    next_write: u64,
    interval: u64,
}

impl WriteCadence {
    pub fn new(interval: u64) -> Self {
        Self {
            time_steps: 0,
            next_write: 0,
            interval: interval.max(1),
        }
    }

    /// Advances one step; returns `true` if this step writes.
    pub fn tick(&mut self) -> bool {
        let due = self.time_steps == self.next_write;
        if due {
            self.next_write = self.time_steps + self.interval;
        }
        self.time_steps += 1;
        due
    }

    /// Steps seen so far.
    pub fn time_steps(&self) -> u64 {
        self.time_steps
    }

    pub fn next_write(&self) -> u64 {
        self.next_write
    }
}

/// Parallel structured writer bound to one container file.
///
/// Construction classifies the requested fields, opens the file and, when
/// fields were found, writes the mesh and the first step. [`H5Write::write`]
/// is then called once per host step on every rank.
pub struct H5Write<K: Container, C: Communicator> {
    config: H5WriteConfig,
    comm: C,
    container: Option<K>,
    path: PathBuf,
    fields: FieldClassification,
    cloud_attribs: Vec<CloudAttribute>,
    storage: FieldStorage,
    cadence: WriteCadence,
    mesh_time: Option<String>,
    /// Set when the host reported a topology change since the last mesh write.
    mesh_dirty: bool,
    manifest: XdmfManifest,
}

impl<K: Container, C: Communicator> H5Write<K, C> {
    pub fn new<H, F>(
        config: H5WriteConfig,
        host: &H,
        comm: C,
        factory: &F,
    ) -> Result<Self, MeshWriteError>
    where
        H: SimulationHost + ?Sized,
        F: ContainerFactory<Output = K>,
    {
        config.validate()?;
        let precision = crate::precision_bytes();
        let fields = classify_fields(&config.object_names, host)?;
        if comm.rank() == 0 {
            log::info!("h5Write {}:", config.name);
            log::info!("  Compiled with {precision} bytes precision.");
            log::info!(
                "  writing every {} iterations: {}",
                config.write_interval,
                fields
                    .scalar_fields
                    .iter()
                    .chain(&fields.vector_fields)
                    .chain(&config.cloud_names)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }

        let (path, container) = open_container(factory, &config.output_dir, &config.name, &comm)?;
        let mut writer = Self {
            cloud_attribs: config.unique_cloud_attribs(),
            storage: FieldStorage {
                chunking: config.chunking,
                compression: config.compression,
            },
            cadence: WriteCadence::new(config.interval_steps()),
            config,
            comm,
            container: Some(container),
            path,
            fields,
            mesh_time: None,
            mesh_dirty: false,
            manifest: XdmfManifest::new(),
        };
        if !writer.fields.is_empty() {
            writer.write_mesh(host)?;
            writer.write(host)?;
        }
        Ok(writer)
    }

    /// Runs one host step. Returns `true` if data was written.
    pub fn write<H>(&mut self, host: &H) -> Result<bool, MeshWriteError>
    where
        H: SimulationHost + ?Sized,
    {
        if self.container.is_none() {
            return Err(MeshWriteError::ContainerClosed);
        }
        // a change on a skipped step still forces the next mesh write
        self.mesh_dirty |= host.mesh_changing();
        if !self.cadence.tick() {
            return Ok(false);
        }
        let time = host.time_name();
        progress!(self.comm, "Writing HDF5 data for time {time}");

        if !self.fields.is_empty() {
            if self.mesh_dirty && self.mesh_time.as_deref() != Some(time.as_str()) {
                self.write_mesh(host)?;
            }
            self.mesh_dirty = false;
            let container = self
                .container
                .as_mut()
                .ok_or(MeshWriteError::ContainerClosed)?;
            let n_cells = host.mesh().n_cells();
            write_fields(
                container,
                &self.comm,
                &time,
                host,
                n_cells,
                &self.fields,
                &self.storage,
            )?;
            self.manifest.record_fields(
                &time,
                &self.fields.scalar_fields,
                &self.fields.vector_fields,
            );
        }

        let container = self
            .container
            .as_mut()
            .ok_or(MeshWriteError::ContainerClosed)?;
        for name in &self.config.cloud_names {
            match write_cloud(container, &self.comm, &time, host, name, &self.cloud_attribs)? {
                CloudWrite::Written(layout) => {
                    self.manifest
                        .record_cloud(name, &time, layout.total(), &self.cloud_attribs)
                }
                CloudWrite::Skipped => {}
            }
        }
        container.flush()?;
        Ok(true)
    }

    /// Closes the file on every rank and, if configured, writes the XDMF
    /// descriptors from rank 0.
    pub fn close(&mut self) -> Result<PathBuf, MeshWriteError> {
        let mut container = self.container.take().ok_or(MeshWriteError::ContainerClosed)?;
        close_container(&mut container, &self.comm)?;
        if self.config.write_xdmf && self.comm.rank() == 0 {
            self.manifest.write_descriptors(&self.path)?;
        }
        Ok(self.path.clone())
    }

    /// Path of the container file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &FieldClassification {
        &self.fields
    }

    pub fn cadence(&self) -> &WriteCadence {
        &self.cadence
    }

    pub fn manifest(&self) -> &XdmfManifest {
        &self.manifest
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    fn write_mesh<H>(&mut self, host: &H) -> Result<(), MeshWriteError>
    where
        H: SimulationHost + ?Sized,
    {
        let container = self
            .container
            .as_mut()
            .ok_or(MeshWriteError::ContainerClosed)?;
        let time = host.time_name();
        let counts = write_mesh(container, &self.comm, &time, host.mesh())?;
        self.manifest.record_mesh(&time, &counts);
        self.mesh_time = Some(time);
        Ok(())
    }
}

impl<K: Container, C: Communicator> Drop for H5Write<K, C> {
    fn drop(&mut self) {
        if self.container.is_some() {
            if let Err(e) = self.close() {
                log::warn!("closing {} failed: {e}", self.path.display());
            }
        }
    }
}
