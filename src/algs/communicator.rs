//! Thin façade over intra-process (threaded) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable**; the size exchange calls `.wait()` before it
//! trusts that a buffer is ready. Messages between the same `(src, dst, tag)`
//! triple are delivered in send order on every backend.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

/// Point-to-point communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Posts a receive of `buf.len()` bytes; the data is returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of cooperating ranks.
    fn size(&self) -> usize;
    /// Blocks until every rank has reached the barrier.
    fn barrier(&self);
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator for serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
}

// --- ThreadComm: in-process ranks on threads ---
type Key = (usize, usize, u16); // (src, dst, tag)

const RECV_TIMEOUT: Duration = Duration::from_secs(60);

struct LocalWorld {
    size: usize,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    barrier: Barrier,
}

/// Receive handle for [`ThreadComm`]; polls the shared mailbox on `wait`.
pub struct LocalHandle {
    world: Arc<LocalWorld>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let started = Instant::now();
        loop {
            if let Some(mut queue) = self.world.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = bytes.len().min(self.len);
                    return Some(bytes[..n].to_vec());
                }
            }
            if started.elapsed() > RECV_TIMEOUT {
                log::warn!(
                    "receive from rank {} (tag {:#06x}) timed out",
                    self.key.0,
                    self.key.2
                );
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// Communicator for ranks simulated as threads of one process.
///
/// Build all ranks of a world at once with [`ThreadComm::world`] and move one
/// handle into each thread.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    world: Arc<LocalWorld>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.world.size)
            .finish()
    }
}

impl ThreadComm {
    /// One communicator per rank, all sharing a fresh mailbox.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let world = Arc::new(LocalWorld {
            size,
            mailbox: DashMap::new(),
            barrier: Barrier::new(size.max(1)),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                world: Arc::clone(&world),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.world
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            world: Arc::clone(&self.world),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::mesh_error::MeshWriteError;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI world communicator. Keeps the universe alive; MPI is finalized on drop.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        pub rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshWriteError> {
            let universe = mpi::initialize().ok_or_else(|| MeshWriteError::CommError {
                neighbor: 0,
                detail: "MPI already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Completed receive; MPI receives are performed eagerly in `irecv`.
    pub struct MpiHandle(Option<Vec<u8>>);

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let status = self
                .world
                .process_at_rank(peer as i32)
                .receive_into_with_tag(buf, i32::from(tag));
            let n = status.count(u8::equivalent_datatype()) as usize;
            MpiHandle(Some(buf[..n.min(buf.len())].to_vec()))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
