//! End-to-end lifecycle of a segmented simulation: submit, dispatch,
//! complete, recombine, close.

use std::fs;
use std::path::Path;

use simqueue::errors::GridError;
use simqueue::graph::AppKind;
use simqueue::sched::{PermissionGuard, Scheduler};
use simqueue::store::{JobState, JobStore, SqliteStore};
use simqueue_test_utils::builders::{ConfigFileBuilder, ParameterFileBuilder, ScriptBuilder};
use simqueue_test_utils::fake_backend::FakeBackend;
use simqueue_test_utils::init_tracing;

struct Fixture {
    _tmp: tempfile::TempDir,
    cfg: simqueue::config::ConfigFile,
    store: SqliteStore,
    script: std::path::PathBuf,
    root: std::path::PathBuf,
}

fn chain_fixture() -> Fixture {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();

    // 60000 steps at stride 500 split into two 30000-step segments
    fs::write(
        root.join("md.in"),
        ParameterFileBuilder::new("equilibration")
            .with("steps", 60000)
            .with("stride", 500)
            .with("cutoff", 0.8)
            .with("seed", 7141)
            .build(),
    )
    .unwrap();
    fs::write(root.join("sys.crd"), "30 coords\n").unwrap();
    fs::write(root.join("sys.top"), "30\natom data\n").unwrap();

    let script = root.join("run.script");
    fs::write(
        &script,
        ScriptBuilder::new()
            .simulate()
            .param("config", root.join("md.in").to_str().unwrap())
            .param("coords", root.join("sys.crd").to_str().unwrap())
            .param("topology", root.join("sys.top").to_str().unwrap())
            .param("traj", root.join("run.traj").to_str().unwrap())
            .param("log", root.join("run.log").to_str().unwrap())
            .param("restart", root.join("run.rst").to_str().unwrap())
            .build(),
    )
    .unwrap();

    let cfg = ConfigFileBuilder::new()
        .with_store_path(root.join("simqueue.db"))
        .with_intermediate_dir(root.join("grid_temp_files"))
        .with_archive_dir(&root)
        .build();
    let store = SqliteStore::open(&cfg.store.path).unwrap();

    Fixture {
        _tmp: tmp,
        cfg,
        store,
        script,
        root,
    }
}

fn owner_guard() -> PermissionGuard {
    PermissionGuard::new(1000, None)
}

#[test]
fn chain_is_two_segments_and_a_recombiner() {
    let fx = chain_fixture();
    let batch = simqueue::submit(&fx.cfg, &fx.store, 1000, &fx.script, None).unwrap();

    let jobs = fx.store.jobs_in_batch(batch).unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].app, AppKind::Simulate);
    assert_eq!(jobs[1].app, AppKind::Simulate);
    assert_eq!(jobs[2].app, AppKind::RecombineSimulate);
    assert_eq!(jobs[1].prereq, Some(jobs[0].id));
    assert_eq!(jobs[2].prereq, Some(jobs[1].id));
    assert!(jobs.iter().all(|j| j.state == JobState::Waiting));

    // the continuation segment restarts without re-seeding
    let seg2 = fs::read_to_string(fx.root.join("grid_temp_files/md.in_2")).unwrap();
    assert!(seg2.contains("steps=30000"));
    assert!(seg2.contains("checkpoint=30000"));
    assert!(seg2.contains("restart=1"));
    assert!(seg2.contains("seed=-1"));

    let seg1 = fs::read_to_string(fx.root.join("grid_temp_files/md.in_1")).unwrap();
    assert!(seg1.contains("seed=7141"));
    assert!(!seg1.contains("restart=1"));
}

#[test]
fn graph_rendering_is_written_on_request() {
    let fx = chain_fixture();
    let dot_path = fx.root.join("graph.dot");
    simqueue::submit(&fx.cfg, &fx.store, 1000, &fx.script, Some(&dot_path)).unwrap();

    let dot = fs::read_to_string(&dot_path).unwrap();
    assert!(dot.contains("simulate"));
    assert!(dot.contains("recombine_simulate"));
}

#[test]
fn full_lifecycle_recombines_and_closes() {
    let fx = chain_fixture();
    let batch = simqueue::submit(&fx.cfg, &fx.store, 1000, &fx.script, None).unwrap();
    let jobs = fx.store.jobs_in_batch(batch).unwrap();
    let (seg1, seg2, recombine) = (jobs[0].id, jobs[1].id, jobs[2].id);

    let mut backend = FakeBackend::new();
    let mut sched = Scheduler::new(&fx.store, &mut backend, &fx.cfg, owner_guard());

    // only the first segment is ready
    sched.advance(seg1).unwrap();
    assert_eq!(fx.store.job(seg1).unwrap().state, JobState::Running);
    assert_eq!(fx.store.job(seg2).unwrap().state, JobState::Waiting);

    // first segment done, but its outputs are not back yet: the
    // continuation cannot be staged and stays waiting
    sched.complete(seg1, true).unwrap();
    assert_eq!(fx.store.job(seg2).unwrap().state, JobState::Waiting);

    let temp = fx.root.join("grid_temp_files");
    fs::write(temp.join("run.rst_1"), "restart one\n").unwrap();
    fs::write(temp.join("run.traj_1"), "header\nsnap 1-60\n").unwrap();
    fs::write(temp.join("run.log_1"), "log one\n").unwrap();
    sched.advance(seg1).unwrap();
    assert_eq!(fx.store.job(seg2).unwrap().state, JobState::Running);

    fs::write(temp.join("run.traj_2"), "header\nsnap 61-120\n").unwrap();
    fs::write(temp.join("run.log_2"), "log two\n").unwrap();
    sched.complete(seg2, true).unwrap();

    // the recombiner ran in-process, the batch closed behind it
    assert!(matches!(
        fx.store.job(recombine),
        Err(GridError::NotAProcess(_))
    ));
    assert_eq!(
        fs::read_to_string(fx.root.join("run.traj")).unwrap(),
        "header\nsnap 1-60\nsnap 61-120\n"
    );
    assert_eq!(
        fs::read_to_string(fx.root.join("run.log")).unwrap(),
        "log one\nlog two\n"
    );
    // temporaries were archived away
    assert!(Path::new(&fx.root.join(format!("raw_data_{batch}"))).exists());
    assert!(!temp.join("run.traj_1").exists());

    assert_eq!(backend.dispatched_jobs(), vec![seg1, seg2]);
}

#[test]
fn failed_segment_invalidates_the_chain_and_closes() {
    let fx = chain_fixture();
    let batch = simqueue::submit(&fx.cfg, &fx.store, 1000, &fx.script, None).unwrap();
    let jobs = fx.store.jobs_in_batch(batch).unwrap();
    let seg1 = jobs[0].id;

    let mut backend = FakeBackend::new();
    let mut sched = Scheduler::new(&fx.store, &mut backend, &fx.cfg, owner_guard());
    sched.advance(seg1).unwrap();
    sched.complete(seg1, false).unwrap();

    // everything went invalid without running, so the batch is gone
    assert!(fx.store.jobs_in_batch(batch).unwrap().is_empty());
    assert!(!fx.root.join("run.traj").exists());
}

#[test]
fn failed_staging_stashes_inputs_for_inspection() {
    let fx = chain_fixture();
    let error_dir = fx.root.join("errors");
    let cfg = ConfigFileBuilder::new()
        .with_store_path(fx.root.join("simqueue.db"))
        .with_intermediate_dir(fx.root.join("grid_temp_files"))
        .with_archive_dir(&fx.root)
        .with_error_dir(&error_dir)
        .build();

    let batch = simqueue::submit(&cfg, &fx.store, 1000, &fx.script, None).unwrap();
    let jobs = fx.store.jobs_in_batch(batch).unwrap();
    let (seg1, seg2) = (jobs[0].id, jobs[1].id);

    let mut backend = FakeBackend::new();
    let mut sched = Scheduler::new(&fx.store, &mut backend, &cfg, owner_guard());
    sched.advance(seg1).unwrap();
    // the restart file never comes back, so the continuation cannot stage;
    // the inputs that did stage land in the error directory
    sched.complete(seg1, true).unwrap();

    assert_eq!(fx.store.job(seg2).unwrap().state, JobState::Waiting);
    assert!(error_dir.join("md.in_2").exists());
}

#[test]
fn stranger_cannot_touch_the_batch() {
    let fx = chain_fixture();
    let batch = simqueue::submit(&fx.cfg, &fx.store, 1000, &fx.script, None).unwrap();
    let first = fx.store.jobs_in_batch(batch).unwrap()[0].id;

    let mut backend = FakeBackend::new();
    let stranger = PermissionGuard::new(2000, None);
    let mut sched = Scheduler::new(&fx.store, &mut backend, &fx.cfg, stranger);

    assert!(matches!(
        sched.advance(first),
        Err(GridError::InsufficientPermission(_))
    ));
    assert!(matches!(
        sched.close(batch),
        Err(GridError::InsufficientPermission(_))
    ));
    assert_eq!(fx.store.job(first).unwrap().state, JobState::Waiting);

    // the configured privileged uid may manage any batch
    let privileged = PermissionGuard::new(2000, Some(2000));
    let mut sched = Scheduler::new(&fx.store, &mut backend, &fx.cfg, privileged);
    sched.advance(first).unwrap();
    assert_eq!(fx.store.job(first).unwrap().state, JobState::Running);
}
