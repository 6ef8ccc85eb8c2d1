//! Size exchange: every rank learns every rank's count and its write offset.
//!
//! Counts are gathered on rank 0 and the complete table is broadcast back,
//! so each rank computes totals and exclusive prefix offsets independently.
//! Every rank must call the exchange functions in the same order; a rank
//! with nothing to contribute still participates with a count of zero.
//!
//! [`exchange_offsets_checked`] additionally lets a rank that hit a local
//! error abort the phase: it contributes a sentinel instead of a count and
//! every rank returns an error, so no rank goes on to issue collective
//! creates the others will never match.

use crate::algs::communicator::{Communicator, Wait};
use crate::algs::wire::{WireCount, decode_counts, encode_counts, expect_exact_len};
use crate::mesh_error::MeshWriteError;

const ROOT: usize = 0;
const GATHER_TAG: u16 = 0x5E00;
const BCAST_TAG: u16 = 0x5E01;
const VALUE_TAG: u16 = 0x5E02;

/// Contributed by a rank that failed locally.
const ABORT_SENTINEL: u64 = u64::MAX;

/// Per-rank counts of one quantity with their prefix offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionLayout {
    rank: usize,
    counts: Vec<usize>,
    offsets: Vec<usize>,
    total: usize,
}

impl PartitionLayout {
    /// Builds the layout from a rank-ordered count table.
    pub fn from_counts(counts: Vec<usize>, rank: usize) -> Self {
        let mut offsets = Vec::with_capacity(counts.len());
        let mut running = 0usize;
        for &c in &counts {
            offsets.push(running);
            running += c;
        }
        Self {
            rank,
            counts,
            offsets,
            total: running,
        }
    }

    #[inline]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Sum of all ranks' counts.
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts.get(rank).copied().unwrap_or(0)
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.offsets.get(rank).copied().unwrap_or(self.total)
    }

    #[inline]
    pub fn my_count(&self) -> usize {
        self.count(self.rank)
    }

    #[inline]
    pub fn my_offset(&self) -> usize {
        self.offset(self.rank)
    }

    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.counts.len()
    }
}

/// Exchanges `local_count` with all ranks.
pub fn exchange_offsets<C: Communicator>(
    local_count: usize,
    comm: &C,
) -> Result<PartitionLayout, MeshWriteError> {
    exchange_offsets_checked(Ok(local_count), comm)
}

/// Like [`exchange_offsets`], but a local `Err` aborts the phase on all ranks.
///
/// The failing rank gets its own error back; all other ranks get
/// [`MeshWriteError::RemoteFailure`] naming the lowest failing rank.
pub fn exchange_offsets_checked<C: Communicator>(
    local: Result<usize, MeshWriteError>,
    comm: &C,
) -> Result<PartitionLayout, MeshWriteError> {
    let contribution = match &local {
        Ok(n) => *n as u64,
        Err(_) => ABORT_SENTINEL,
    };
    let table = all_gather_u64(contribution, comm)?;
    if let Err(err) = local {
        return Err(err);
    }
    if let Some(rank) = table.iter().position(|&n| n == ABORT_SENTINEL) {
        return Err(MeshWriteError::RemoteFailure { rank });
    }
    let counts = table.into_iter().map(|n| n as usize).collect();
    Ok(PartitionLayout::from_counts(counts, comm.rank()))
}

/// Broadcasts `value` from `root` to every rank.
pub fn broadcast_u64<C: Communicator>(
    value: u64,
    root: usize,
    comm: &C,
) -> Result<u64, MeshWriteError> {
    let size = comm.size();
    if size <= 1 {
        return Ok(value);
    }
    if comm.rank() == root {
        let bytes = encode_counts(&[value]);
        let sends: Vec<_> = (0..size)
            .filter(|&peer| peer != root)
            .map(|peer| comm.isend(peer, VALUE_TAG, &bytes))
            .collect();
        for send in sends {
            let _ = send.wait();
        }
        Ok(value)
    } else {
        let mut buf = [0u8; WireCount::SIZE];
        let data = comm
            .irecv(root, VALUE_TAG, &mut buf)
            .wait()
            .ok_or_else(|| MeshWriteError::CommError {
                neighbor: root,
                detail: "failed to receive broadcast value".into(),
            })?;
        expect_exact_len(data.len(), WireCount::SIZE).map_err(|detail| {
            MeshWriteError::CommError {
                neighbor: root,
                detail,
            }
        })?;
        Ok(decode_counts(&data)[0])
    }
}

/// Gathers one value per rank on the root and broadcasts the table back.
fn all_gather_u64<C: Communicator>(local: u64, comm: &C) -> Result<Vec<u64>, MeshWriteError> {
    let size = comm.size();
    let rank = comm.rank();
    if size <= 1 {
        return Ok(vec![local]);
    }

    if rank == ROOT {
        // 1) collect every peer's count; a failed peer is recorded as aborted
        //    so the broadcast below still releases the others
        let mut table = vec![0u64; size];
        table[ROOT] = local;
        let mut maybe_err = None;
        for (peer, slot) in table.iter_mut().enumerate().skip(1) {
            let mut buf = [0u8; WireCount::SIZE];
            match comm.irecv(peer, GATHER_TAG, &mut buf).wait() {
                Some(data) if data.len() == WireCount::SIZE => {
                    *slot = decode_counts(&data)[0];
                }
                Some(data) => {
                    *slot = ABORT_SENTINEL;
                    if maybe_err.is_none() {
                        maybe_err = Some(MeshWriteError::CommError {
                            neighbor: peer,
                            detail: format!(
                                "expected {} bytes for size header, got {}",
                                WireCount::SIZE,
                                data.len()
                            ),
                        });
                    }
                }
                None => {
                    *slot = ABORT_SENTINEL;
                    if maybe_err.is_none() {
                        maybe_err = Some(MeshWriteError::CommError {
                            neighbor: peer,
                            detail: format!("failed to receive size from rank {peer}"),
                        });
                    }
                }
            }
        }

        // 2) broadcast the table, always draining sends before returning
        let bytes = encode_counts(&table);
        let sends: Vec<_> = (1..size)
            .map(|peer| comm.isend(peer, BCAST_TAG, &bytes))
            .collect();
        for send in sends {
            let _ = send.wait();
        }

        match maybe_err {
            Some(err) => Err(err),
            None => Ok(table),
        }
    } else {
        let _ = comm
            .isend(ROOT, GATHER_TAG, &encode_counts(&[local]))
            .wait();
        let expected = size * WireCount::SIZE;
        let mut buf = vec![0u8; expected];
        let data = comm
            .irecv(ROOT, BCAST_TAG, &mut buf)
            .wait()
            .ok_or_else(|| MeshWriteError::CommError {
                neighbor: ROOT,
                detail: "failed to receive size table".into(),
            })?;
        if data.len() != expected {
            return Err(MeshWriteError::CommSizeMismatch {
                expected,
                found: data.len(),
            });
        }
        Ok(decode_counts(&data))
    }
}
