//! Container lifecycle: choosing the file name, opening and closing.

use crate::algs::communicator::Communicator;
use crate::algs::size_exchange::broadcast_u64;
use crate::io::container::{Container, ContainerFactory};
use crate::mesh_error::MeshWriteError;
use std::path::{Path, PathBuf};

const ROOT: usize = 0;
const PROBE_FAILED: u64 = u64::MAX;

/// File extension of containers.
pub const EXTENSION: &str = "h5";

/// Path of container number `index`: `<dir>/<name><index>.h5`.
pub fn numbered_file(dir: &Path, name: &str, index: u64) -> PathBuf {
    dir.join(format!("{name}{index}.{EXTENSION}"))
}

/// Picks the first unused `<dir>/<name><N>.h5`.
///
/// Rank 0 prepares the directory and probes for the index, then broadcasts
/// it so every rank opens the same file.
pub fn choose_file_name<F, C>(
    factory: &F,
    dir: &Path,
    name: &str,
    comm: &C,
) -> Result<PathBuf, MeshWriteError>
where
    F: ContainerFactory,
    C: Communicator,
{
    let probed = if comm.rank() == ROOT {
        probe_index(factory, dir, name)
    } else {
        Ok(0)
    };
    // peers learn about a failed probe through the sentinel
    let index = broadcast_u64(*probed.as_ref().unwrap_or(&PROBE_FAILED), ROOT, comm)?;
    probed?;
    if index == PROBE_FAILED {
        return Err(MeshWriteError::RemoteFailure { rank: ROOT });
    }
    let path = numbered_file(dir, name, index);
    if comm.rank() == ROOT {
        log::info!("Chosen filename: {}", path.display());
    }
    Ok(path)
}

fn probe_index<F: ContainerFactory>(
    factory: &F,
    dir: &Path,
    name: &str,
) -> Result<u64, MeshWriteError> {
    factory.prepare_dir(dir)?;
    let mut index = 0u64;
    while factory.exists(&numbered_file(dir, name, index)) {
        index += 1;
    }
    Ok(index)
}

/// Chooses the file name and opens the container on every rank.
pub fn open_container<F, C>(
    factory: &F,
    dir: &Path,
    name: &str,
    comm: &C,
) -> Result<(PathBuf, F::Output), MeshWriteError>
where
    F: ContainerFactory,
    C: Communicator,
{
    let path = choose_file_name(factory, dir, name, comm)?;
    let container = factory.create(&path)?;
    Ok((path, container))
}

/// Waits for every rank, then closes the container.
pub fn close_container<K, C>(container: &mut K, comm: &C) -> Result<(), MeshWriteError>
where
    K: Container,
    C: Communicator,
{
    comm.barrier();
    container.close()
}
