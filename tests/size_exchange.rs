use mesh_h5write::algs::communicator::{Communicator, NoComm, Wait};
use mesh_h5write::algs::size_exchange::{exchange_offsets, exchange_offsets_checked};
use mesh_h5write::algs::wire::encode_counts;
use mesh_h5write::mesh_error::MeshWriteError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct DummySendHandle {
    waited: Arc<AtomicBool>,
}

impl Wait for DummySendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        self.waited.store(true, Ordering::SeqCst);
        None
    }
}

struct DummyRecvHandle {
    waited: Arc<AtomicBool>,
    resp: Option<Vec<u8>>,
}

impl Wait for DummyRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        self.waited.store(true, Ordering::SeqCst);
        self.resp
    }
}

/// Scripted communicator: every receive from `(peer, tag)` returns the
/// canned response, every handle records whether it was waited.
struct DummyComm {
    rank: usize,
    size: usize,
    responses: HashMap<(usize, u16), Option<Vec<u8>>>,
    send_flags: Mutex<Vec<Arc<AtomicBool>>>,
    recv_flags: Mutex<Vec<Arc<AtomicBool>>>,
    sent: Mutex<Vec<(usize, u16, Vec<u8>)>>,
}

impl DummyComm {
    fn new(rank: usize, size: usize, responses: HashMap<(usize, u16), Option<Vec<u8>>>) -> Self {
        Self {
            rank,
            size,
            responses,
            send_flags: Mutex::new(Vec::new()),
            recv_flags: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn all_waited(&self) -> bool {
        let sends = self.send_flags.lock().unwrap();
        let recvs = self.recv_flags.lock().unwrap();
        sends.iter().chain(recvs.iter()).all(|f| f.load(Ordering::SeqCst))
    }
}

impl Communicator for DummyComm {
    type SendHandle = DummySendHandle;
    type RecvHandle = DummyRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let flag = Arc::new(AtomicBool::new(false));
        self.send_flags.lock().unwrap().push(flag.clone());
        self.sent.lock().unwrap().push((peer, tag, buf.to_vec()));
        DummySendHandle { waited: flag }
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        let flag = Arc::new(AtomicBool::new(false));
        self.recv_flags.lock().unwrap().push(flag.clone());
        let resp = self.responses.get(&(peer, tag)).cloned().unwrap_or(None);
        DummyRecvHandle { waited: flag, resp }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {}
}

const GATHER: u16 = 0x5E00;
const BCAST: u16 = 0x5E01;

#[test]
fn serial_counts_need_no_messages() {
    let layout = exchange_offsets(9, &NoComm).unwrap();
    assert_eq!(layout.total(), 9);
    assert_eq!(layout.offsets(), &[0]);
}

#[test]
fn root_reports_malformed_peer_and_still_broadcasts() {
    let mut responses = HashMap::new();
    // rank 1 sends a correct 8-byte count
    responses.insert((1, GATHER), Some(encode_counts(&[3])));
    // rank 2 sends only 2 bytes -> mismatch
    responses.insert((2, GATHER), Some(vec![0u8; 2]));
    let comm = DummyComm::new(0, 3, responses);

    let err = exchange_offsets(5, &comm).unwrap_err();
    match err {
        MeshWriteError::CommError { neighbor, .. } => assert_eq!(neighbor, 2),
        other => panic!("unexpected error {other:?}"),
    }

    // both peers are released with the table, the bad slot marked aborted
    let sent = comm.sent.lock().unwrap();
    let peers: Vec<usize> = sent.iter().map(|(p, _, _)| *p).collect();
    assert_eq!(peers, vec![1, 2]);
    assert!(sent.iter().all(|(_, tag, _)| *tag == BCAST));
    assert_eq!(sent[0].2, encode_counts(&[5, 3, u64::MAX]));
    drop(sent);
    assert!(comm.all_waited());
}

#[test]
fn missing_peer_message_is_a_comm_error() {
    let mut responses = HashMap::new();
    responses.insert((1, GATHER), None);
    let comm = DummyComm::new(0, 2, responses);
    let err = exchange_offsets(1, &comm).unwrap_err();
    assert!(matches!(err, MeshWriteError::CommError { neighbor: 1, .. }));
    assert!(comm.all_waited());
}

#[test]
fn non_root_sees_short_table() {
    let mut responses = HashMap::new();
    responses.insert((0, BCAST), Some(encode_counts(&[1])));
    let comm = DummyComm::new(1, 2, responses);
    let err = exchange_offsets(4, &comm).unwrap_err();
    assert_eq!(
        err,
        MeshWriteError::CommSizeMismatch {
            expected: 16,
            found: 8
        }
    );
    // its own count still went to the root
    let sent = comm.sent.lock().unwrap();
    assert_eq!(sent.as_slice(), &[(0, GATHER, encode_counts(&[4]))]);
}

#[test]
fn non_root_reads_offsets_from_table() {
    let mut responses = HashMap::new();
    responses.insert((0, BCAST), Some(encode_counts(&[2, 4, 6])));
    let comm = DummyComm::new(2, 3, responses);
    let layout = exchange_offsets_checked(Ok(6), &comm).unwrap();
    assert_eq!(layout.my_offset(), 6);
    assert_eq!(layout.total(), 12);
    assert!(comm.all_waited());
}

#[test]
fn aborted_slot_in_table_names_the_failing_rank() {
    let mut responses = HashMap::new();
    responses.insert((0, BCAST), Some(encode_counts(&[2, u64::MAX, 6])));
    let comm = DummyComm::new(2, 3, responses);
    assert_eq!(
        exchange_offsets(6, &comm),
        Err(MeshWriteError::RemoteFailure { rank: 1 })
    );
}
