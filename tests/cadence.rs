mod util;

use mesh_h5write::prelude::*;
use proptest::prelude::*;
use util::{mixed_mesh, run_ranks, tet_mesh};

fn field_host(mesh: LocalMesh) -> InMemoryHost {
    let n = mesh.n_cells();
    let mut host = InMemoryHost::new(mesh);
    host.insert_scalar("p", vec![1.0; n]);
    host.insert_vector("U", vec![[0.0, 1.0, 2.0]; n]);
    host
}

/// Runs `steps` host steps after construction and returns the time labels
/// that produced a field group.
fn written_times(interval: i64, steps: usize) -> Vec<String> {
    let store = MemStore::new();
    let mut host = field_host(tet_mesh(0.0));
    let config = H5WriteConfig::new(interval).with_objects(["p", "U"]);
    let mut writer = H5Write::new(config, &host, NoComm, &store.factory(0)).unwrap();
    for step in 1..=steps {
        host.set_time_name(step.to_string());
        writer.write(&host).unwrap();
    }
    let file = writer.close().unwrap();
    let mut times: Vec<String> = store
        .dataset_paths(&file)
        .iter()
        .filter_map(|p| p.strip_prefix("FIELDS/"))
        .filter_map(|p| p.split('/').next())
        .map(str::to_owned)
        .collect();
    times.dedup();
    times.sort_by_key(|t| t.parse::<usize>().unwrap_or(usize::MAX));
    times
}

#[test]
fn writes_at_multiples_of_the_interval() {
    assert_eq!(written_times(3, 10), vec!["0", "3", "6", "9"]);
    assert_eq!(written_times(1, 3), vec!["0", "1", "2", "3"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn no_write_between_multiples(k in 1i64..6, steps in 0usize..20) {
        let expected: Vec<String> = (0..=steps)
            .filter(|s| *s as i64 % k == 0)
            .map(|s| s.to_string())
            .collect();
        prop_assert_eq!(written_times(k, steps), expected);
    }
}

#[test]
fn mesh_is_rewritten_only_when_it_changes() {
    let store = MemStore::new();
    let files = run_ranks(2, |comm| {
        let rank = comm.rank();
        let mut host = field_host(tet_mesh(rank as f64));
        let config = H5WriteConfig::new(1).with_objects(["p"]);
        let mut writer = H5Write::new(config, &host, comm, &store.factory(rank)).unwrap();

        host.set_time_name("1");
        writer.write(&host).unwrap();

        host.set_time_name("2");
        host.set_mesh(mixed_mesh());
        host.insert_scalar("p", vec![2.0; 3]);
        writer.write(&host).unwrap();
        host.set_mesh_changing(false);

        host.set_time_name("3");
        writer.write(&host).unwrap();
        writer.close().unwrap()
    });
    let file = &files[0];
    store.verify_collectives(file).unwrap();
    let mesh_times: Vec<String> = store
        .dataset_paths(file)
        .iter()
        .filter(|p| p.ends_with("processor0/CELLS"))
        .cloned()
        .collect();
    assert_eq!(
        mesh_times,
        vec!["MESH/0/processor0/CELLS", "MESH/2/processor0/CELLS"]
    );
    assert_eq!(store.attribute(file, "MESH/2/processor1/CELLS", "nCells"), Some(3));
    assert_eq!(store.shape(file, "FIELDS/3/processor1/p"), Some(vec![3]));
}

#[test]
fn changing_flag_at_construction_time_does_not_duplicate_the_mesh() {
    let store = MemStore::new();
    let mut host = field_host(tet_mesh(0.0));
    host.set_mesh_changing(true);
    let config = H5WriteConfig::new(1).with_objects(["p"]);
    let mut writer = H5Write::new(config, &host, NoComm, &store.factory(0)).unwrap();
    let file = writer.close().unwrap();
    store.verify_collectives(&file).unwrap();
    assert_eq!(
        store
            .dataset_paths(&file)
            .iter()
            .filter(|p| p.starts_with("MESH/"))
            .count(),
        2
    );
}

#[test]
fn nothing_is_classified_so_nothing_is_written_at_construction() {
    let store = MemStore::new();
    let host = field_host(tet_mesh(0.0));
    let config = H5WriteConfig::new(1).with_objects(["T"]);
    let mut writer = H5Write::new(config, &host, NoComm, &store.factory(0)).unwrap();
    assert!(writer.fields().is_empty());
    assert_eq!(writer.cadence().time_steps(), 0);
    assert!(writer.write(&host).unwrap());
    let file = writer.close().unwrap();
    assert!(store.dataset_paths(&file).is_empty());
    assert_eq!(store.flush_count(&file), 1);
}

#[test]
fn change_on_a_skipped_step_rewrites_the_mesh_at_the_next_write() {
    let store = MemStore::new();
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let mut host = field_host(tet_mesh(rank as f64));
        let config = H5WriteConfig::new(2).with_objects(["p"]);
        let mut writer = H5Write::new(config, &host, comm, &store.factory(rank)).unwrap();

        // step 1 is not written, but the topology changes here
        host.set_time_name("1");
        host.set_mesh(mixed_mesh());
        host.insert_scalar("p", vec![2.0; 3]);
        assert!(!writer.write(&host).unwrap());

        host.set_time_name("2");
        host.set_mesh_changing(false);
        assert!(writer.write(&host).unwrap());

        let xdmf = writer.manifest().render_fields("h5Data0.h5").unwrap().unwrap();
        (writer.close().unwrap(), xdmf)
    });
    let (file, xdmf) = &results[0];
    store.verify_collectives(file).unwrap();
    assert_eq!(store.attribute(file, "MESH/2/processor0/CELLS", "nCells"), Some(3));
    assert_eq!(store.shape(file, "MESH/2/processor1/POINTS"), Some(vec![11, 3]));
    assert_eq!(store.shape(file, "FIELDS/2/processor0/p"), Some(vec![3]));
    assert!(store.dataset_paths(file).iter().all(|p| !p.starts_with("MESH/1/")));
    assert!(xdmf.contains("h5Data0.h5:/MESH/2/processor0/CELLS"));
}
