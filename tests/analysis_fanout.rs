//! Analysis commands fan out into per-snapshot-range batches that run in
//! parallel and recombine into one result file.

use std::fs;

use simqueue::errors::GridError;
use simqueue::graph::AppKind;
use simqueue::sched::{PermissionGuard, Scheduler};
use simqueue::store::{JobState, JobStore, PersistedJob, SqliteStore};
use simqueue_test_utils::builders::{ConfigFileBuilder, ParameterFileBuilder, ScriptBuilder};
use simqueue_test_utils::fake_backend::FakeBackend;
use simqueue_test_utils::init_tracing;

struct Fixture {
    _tmp: tempfile::TempDir,
    cfg: simqueue::config::ConfigFile,
    store: SqliteStore,
    root: std::path::PathBuf,
}

fn fixture() -> Fixture {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(
        root.join("en.in"),
        ParameterFileBuilder::new("scoring").with("cutoff", 0.8).build(),
    )
    .unwrap();
    fs::write(root.join("sys.top"), "3\natom data\n").unwrap();
    fs::write(root.join("run.traj"), "header\nf1\nf2\nf3\n").unwrap();

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
        root,
    }
}

fn submit_analysis(fx: &Fixture, frames: &str) -> Vec<PersistedJob> {
    let script = fx.root.join("analyze.script");
    fs::write(
        &script,
        ScriptBuilder::new()
            .analyze()
            .param("config", fx.root.join("en.in").to_str().unwrap())
            .param("topology", fx.root.join("sys.top").to_str().unwrap())
            .param("traj", fx.root.join("run.traj").to_str().unwrap())
            .param("out", fx.root.join("run.dat").to_str().unwrap())
            .param("frames", frames)
            .build(),
    )
    .unwrap();
    let batch = simqueue::submit(&fx.cfg, &fx.store, 1000, &script, None).unwrap();
    fx.store.jobs_in_batch(batch).unwrap()
}

#[test]
fn frames_split_into_bounded_batches() {
    let fx = fixture();
    let jobs = submit_analysis(&fx, "1-25");

    // 25 frames at 10 per batch: three analyses plus one recombiner
    assert_eq!(jobs.len(), 4);
    let analyses: Vec<&PersistedJob> =
        jobs.iter().filter(|j| j.app == AppKind::Analyze).collect();
    assert_eq!(analyses.len(), 3);
    assert_eq!(jobs[3].app, AppKind::RecombineAnalyze);

    // each batch is renumbered from 1 and carries its global offset
    assert_eq!(analyses[0].arguments, "-frames 1-10");
    assert_eq!(analyses[1].arguments, "-frames 1-10");
    assert_eq!(analyses[2].arguments, "-frames 1-5");
    let offsets: Vec<u64> = analyses.iter().map(|j| j.snapshot_offset).collect();
    assert_eq!(offsets, vec![0, 10, 20]);

    // no ordering edges between batches, they fan out together
    assert!(analyses.iter().all(|j| j.prereq.is_none()));
}

#[test]
fn a_gap_in_the_frame_list_starts_a_new_batch() {
    let fx = fixture();
    let jobs = submit_analysis(&fx, "1-3,7-8");

    let analyses: Vec<&PersistedJob> =
        jobs.iter().filter(|j| j.app == AppKind::Analyze).collect();
    assert_eq!(analyses.len(), 2);
    assert_eq!(analyses[0].arguments, "-frames 1-3");
    assert_eq!(analyses[1].arguments, "-frames 1-2");
    assert_eq!(analyses[1].snapshot_offset, 6);
}

#[test]
fn single_batch_writes_the_result_directly() {
    let fx = fixture();
    let jobs = submit_analysis(&fx, "2-4");

    assert_eq!(jobs.len(), 1);
    let out = fx
        .store
        .files_of(jobs[0].id)
        .unwrap()
        .into_iter()
        .find(|f| f.param == "out")
        .unwrap();
    assert!(out.name.ends_with("run.dat"));
    assert!(out.kind.is_output());
    assert!(!out.kind.is_temporary());
}

#[test]
fn batches_recombine_into_one_result() {
    let fx = fixture();
    let jobs = submit_analysis(&fx, "1-25");
    let recombine = jobs[3].id;

    let mut backend = FakeBackend::new();
    let dispatch_log = backend.log();
    let guard = PermissionGuard::new(1000, None);
    let mut sched = Scheduler::new(&fx.store, &mut backend, &fx.cfg, guard);
    sched.advance(jobs[0].id).unwrap();
    assert_eq!(dispatch_log.lock().unwrap().len(), 3);
    assert_eq!(fx.store.job(recombine).unwrap().state, JobState::Waiting);

    // results come back out of order; the recombiner still assembles
    // them by snapshot position
    let temp = fx.root.join("grid_temp_files");
    for (job, text) in [
        (jobs[2].id, "scores 21-25\n"),
        (jobs[0].id, "scores 1-10\n"),
        (jobs[1].id, "scores 11-20\n"),
    ] {
        let out = fx
            .store
            .files_of(job)
            .unwrap()
            .into_iter()
            .find(|f| f.param == "out")
            .unwrap();
        fs::write(temp.join(&out.name), text).unwrap();
        sched.complete(job, true).unwrap();
    }

    assert_eq!(
        fs::read_to_string(fx.root.join("run.dat")).unwrap(),
        "scores 1-10\nscores 11-20\nscores 21-25\n"
    );
    assert!(fx.store.jobs_in_batch(1).unwrap().is_empty());
}

#[test]
fn zero_frame_selection_is_rejected() {
    let fx = fixture();
    let script = fx.root.join("bad.script");
    fs::write(
        &script,
        ScriptBuilder::new()
            .analyze()
            .param("config", fx.root.join("en.in").to_str().unwrap())
            .param("topology", fx.root.join("sys.top").to_str().unwrap())
            .param("traj", fx.root.join("run.traj").to_str().unwrap())
            .param("out", fx.root.join("run.dat").to_str().unwrap())
            .param("frames", "0-5")
            .build(),
    )
    .unwrap();
    let err = simqueue::submit(&fx.cfg, &fx.store, 1000, &script, None).unwrap_err();
    assert!(matches!(err, GridError::InvalidInputParameter(_)));
}
