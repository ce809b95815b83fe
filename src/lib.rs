// src/lib.rs

//! simqueue: splits long simulation scripts into bounded-size job graphs
//! and drives them across a distributed-compute backend.
//!
//! A submission script is parsed into commands, each command is expanded
//! into segment chains or snapshot batches, and the resulting graph is
//! persisted. From then on every CLI invocation is one stateless
//! query -> decide -> persist cycle against the store.

pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod files;
pub mod graph;
pub mod logging;
pub mod params;
pub mod sched;
pub mod script;
pub mod segment;
pub mod store;

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::backend::SimulatedBackend;
use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::errors::{GridError, Result};
use crate::files::FileRegistry;
use crate::graph::{ArgValue, Batch, LocalId};
use crate::sched::{PermissionGuard, Scheduler};
use crate::store::{
    BatchId, JobId, JobState, JobStore, NewJob, PersistedFile, SqliteStore, Uid,
};

/// Parse a submission script, expand it into a job graph and persist it.
/// Returns the new batch id.
pub fn submit<S: JobStore>(
    cfg: &ConfigFile,
    store: &S,
    owner: Uid,
    script_path: &Path,
    graph_out: Option<&Path>,
) -> Result<BatchId> {
    let text = std::fs::read_to_string(script_path)
        .map_err(|_| GridError::MissingInputFile(script_path.display().to_string()))?;
    std::fs::create_dir_all(&cfg.dirs.intermediate)?;

    let mut registry = FileRegistry::new();
    let commands = script::parse_script(&text, &mut registry)?;
    let batch = graph::build_batch(cfg, &commands, registry)?;

    if let Some(path) = graph_out {
        std::fs::write(path, graph::render_dot(&batch))?;
        info!(path = %path.display(), "wrote job graph rendering");
    }

    persist_batch(store, &batch, owner)
}

/// Insert a built batch into the store, mapping graph-local node ids onto
/// store-assigned job ids.
fn persist_batch<S: JobStore>(store: &S, batch: &Batch, owner: Uid) -> Result<BatchId> {
    let batch_id = store.next_batch_id()?;
    let submit_time = Utc::now().to_rfc3339();
    let mut ids: HashMap<LocalId, JobId> = HashMap::new();

    for node in &batch.nodes {
        let prereq = match node.prereq {
            Some(local) => Some(mapped(&ids, local)?),
            None => None,
        };
        let arguments = node
            .args
            .iter()
            .filter_map(|a| match &a.value {
                ArgValue::Literal(v) => Some(format!("-{} {v}", a.name)),
                ArgValue::File(_) => None,
            })
            .collect::<Vec<_>>()
            .join(" ");

        let id = store.insert_job(&NewJob {
            batch: batch_id,
            local_id: node.local_id,
            app: node.app,
            state: JobState::Waiting,
            owner,
            prereq,
            estimate: node.estimate,
            snapshot_offset: node.snapshot_offset,
            arguments,
            submit_time: submit_time.clone(),
        })?;
        ids.insert(node.local_id, id);

        for arg in &node.args {
            let ArgValue::File(idx) = arg.value else {
                continue;
            };
            let desc = batch.registry.get(idx).ok_or_else(|| {
                GridError::NullReference(format!("file index {idx} out of range"))
            })?;
            let parent = match desc.parent {
                Some(local) => Some(mapped(&ids, local)?),
                None => None,
            };
            store.insert_file(&PersistedFile {
                id: 0,
                job: id,
                param: arg.name.clone(),
                name: desc.name.clone(),
                alias: desc.alias.clone(),
                kind: desc.kind,
                subdirectory: desc.subdirectory.clone(),
                parent,
            })?;
        }
    }

    info!(batch = batch_id, jobs = batch.nodes.len(), "batch submitted");
    Ok(batch_id)
}

fn mapped(ids: &HashMap<LocalId, JobId>, local: LocalId) -> Result<JobId> {
    ids.get(&local).copied().ok_or_else(|| {
        GridError::NullReference(format!("node {local} referenced before insertion"))
    })
}

/// Execute one CLI invocation.
pub fn run(args: CliArgs) -> Result<()> {
    let cfg = config::load_or_default(Path::new(&args.config))?;
    let store = SqliteStore::open(&cfg.store.path)?;
    let guard = match args.uid {
        Some(uid) => PermissionGuard::new(uid, cfg.auth.privileged_uid),
        None => PermissionGuard::current(cfg.auth.privileged_uid),
    };
    let mut backend = SimulatedBackend;

    match args.command {
        Command::Submit {
            script,
            graph,
            start,
        } => {
            let batch = submit(&cfg, &store, guard.requester(), &script, graph.as_deref())?;
            println!("{batch}");
            if start {
                if let Some(first) = store.jobs_in_batch(batch)?.first().map(|j| j.id) {
                    Scheduler::new(&store, &mut backend, &cfg, guard).advance(first)?;
                }
            }
        }
        Command::Process { id } => {
            Scheduler::new(&store, &mut backend, &cfg, guard).advance(id)?;
        }
        Command::Status { id } => {
            let job = store.job(id)?;
            println!(
                "{} batch={} app={} state={}",
                job.id,
                job.batch,
                job.app.name(),
                job.state.name()
            );
        }
        Command::Abort { batch } => {
            Scheduler::new(&store, &mut backend, &cfg, guard).close(batch)?;
        }
        Command::Recombine { id } => {
            Scheduler::new(&store, &mut backend, &cfg, guard).recombine(id)?;
        }
        Command::List { batch } => match batch {
            Some(batch) => {
                for job in store.jobs_in_batch(batch)? {
                    println!(
                        "{} app={} state={}",
                        job.id,
                        job.app.name(),
                        job.state.name()
                    );
                }
            }
            None => {
                for batch in store.distinct_batches()? {
                    println!("{batch}");
                }
            }
        },
        Command::Next { batch } => {
            let batches = match batch {
                Some(batch) => vec![batch],
                None => store.distinct_batches()?,
            };
            for batch in batches {
                for job in store.ready_jobs(batch)? {
                    println!("{} batch={} app={}", job.id, job.batch, job.app.name());
                }
            }
        }
        Command::Finished => {
            for batch in store.finished_batches()? {
                println!("{batch}");
            }
        }
        Command::Running => {
            for job in store
                .query_by_state(JobState::Running)?
                .iter()
                .filter(|j| j.owner == guard.requester())
            {
                println!("{} batch={} app={}", job.id, job.batch, job.app.name());
            }
        }
        Command::Complete {
            id,
            success,
            failed,
        } => {
            if success == failed {
                return Err(GridError::InvalidCliArgument(
                    "complete requires exactly one of --success or --failed".to_string(),
                ));
            }
            Scheduler::new(&store, &mut backend, &cfg, guard).complete(id, success)?;
        }
    }
    Ok(())
}
