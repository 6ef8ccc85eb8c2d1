mod util;

use mesh_h5write::io::mesh_writer::{decode_cells, write_mesh};
use mesh_h5write::prelude::*;
use std::path::Path;
use util::{mixed_mesh, run_ranks, tet_mesh};

fn mesh_for(rank: usize) -> LocalMesh {
    match rank {
        1 => mixed_mesh(),
        2 => LocalMesh::default(),
        r => tet_mesh(r as f64),
    }
}

#[test]
fn cells_and_points_survive_the_layout() {
    let store = MemStore::new();
    let file = Path::new("roundtrip.h5");
    let counts = run_ranks(4, |comm| {
        let mut c = store.factory(comm.rank()).create(file).unwrap();
        let counts = write_mesh(&mut c, &comm, "0.25", &mesh_for(comm.rank())).unwrap();
        c.close().unwrap();
        counts
    });
    store.verify_collectives(file).unwrap();
    assert!(counts.iter().all(|c| c.points.counts() == counts[0].points.counts()));
    assert_eq!(counts[2].points.my_count(), 0);
    assert_eq!(counts[0].cells.counts(), &[1, 3, 0, 1]);
    assert_eq!(counts[0].streams.counts(), &[5, 9 + 6 + 7, 0, 5]);

    for rank in 0..4 {
        let expected = mesh_for(rank);
        let cells_path = format!("MESH/0.25/processor{rank}/CELLS");
        let n_cells = store.attribute(file, &cells_path, "nCells").unwrap();
        let stream = store.read_ints(file, &cells_path).unwrap();
        let cells = decode_cells(&stream, n_cells as usize).unwrap();
        assert_eq!(cells, expected.cells());

        let coords = store
            .read_floats(file, &format!("MESH/0.25/processor{rank}/POINTS"))
            .unwrap();
        let points: Vec<[f64; 3]> = coords
            .chunks_exact(3)
            .map(|c| [c[0] as f64, c[1] as f64, c[2] as f64])
            .collect();
        assert_eq!(points, expected.points());
    }
}

#[test]
fn mixed_stream_uses_visualization_codes() {
    let store = MemStore::new();
    let file = Path::new("codes.h5");
    let mut c = store.factory(0).create(file).unwrap();
    write_mesh(&mut c, &NoComm, "0", &mixed_mesh()).unwrap();
    let stream = store.read_ints(file, "MESH/0/processor0/CELLS").unwrap();
    assert_eq!(stream[0], 9);
    assert_eq!(stream[9], 7);
    assert_eq!(stream[15], 8);
}
