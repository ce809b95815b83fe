// src/sched/scheduler.rs

//! The query -> decide -> persist cycle.
//!
//! Each operation re-reads job state from the store, applies one round of
//! transitions and writes them back. Nothing is held in memory between
//! invocations, so a crash at any point leaves a state the next
//! invocation picks up cleanly.

use tracing::{debug, error, info, warn};

use crate::backend::{ComputeBackend, DispatchUnit, StagedFile, unit_name};
use crate::config::ConfigFile;
use crate::errors::{GridError, Result};
use crate::sched::internal;
use crate::sched::permission::PermissionGuard;
use crate::store::{BatchId, JobId, JobState, JobStore, PersistedJob};

pub struct Scheduler<'a, S: JobStore, B: ComputeBackend> {
    store: &'a S,
    backend: &'a mut B,
    cfg: &'a ConfigFile,
    guard: PermissionGuard,
}

impl<'a, S: JobStore, B: ComputeBackend> Scheduler<'a, S, B> {
    pub fn new(
        store: &'a S,
        backend: &'a mut B,
        cfg: &'a ConfigFile,
        guard: PermissionGuard,
    ) -> Self {
        Self {
            store,
            backend,
            cfg,
            guard,
        }
    }

    /// Advance the batch containing `job`: propagate invalidations, then
    /// start everything whose prerequisites are met.
    pub fn advance(&mut self, job: JobId) -> Result<()> {
        let job = self.store.job(job)?;
        self.guard.check(job.owner)?;
        self.advance_batch(job.batch)
    }

    pub(crate) fn advance_batch(&mut self, batch: BatchId) -> Result<()> {
        self.cascade_invalid(batch)?;

        // Internal jobs finish immediately and can unblock further jobs,
        // so keep going until a pass runs none.
        loop {
            let ready = self.store.ready_jobs(batch)?;
            let mut ran_internal = false;
            for job in ready {
                if job.app.is_internal() {
                    self.run_internal_job(&job)?;
                    ran_internal = true;
                } else {
                    self.dispatch_job(&job)?;
                }
            }
            if !ran_internal {
                break;
            }
        }

        self.close_if_finished(batch)
    }

    /// Record a completion report from the compute backend.
    pub fn complete(&mut self, job: JobId, success: bool) -> Result<()> {
        let job = self.store.job(job)?;
        self.guard.check(job.owner)?;
        // Terminal states are final; a duplicate or contradictory report
        // must not undo an already-cascaded invalidation.
        if job.state.is_terminal() {
            warn!(
                job = job.id,
                state = job.state.name(),
                "completion report for a job already terminal, ignoring"
            );
            return Ok(());
        }
        if job.state != JobState::Running {
            warn!(
                job = job.id,
                state = job.state.name(),
                "completion report for a job that is not running"
            );
        }

        if success {
            info!(job = job.id, "job finished successfully");
            self.store.update_state(job.id, JobState::Success)?;
            self.advance_batch(job.batch)
        } else {
            warn!(job = job.id, "job failed, invalidating its descendants");
            self.store.update_state(job.id, JobState::Invalid)?;
            self.invalidate_descendants(job.id)?;
            self.close_if_finished(job.batch)
        }
    }

    /// Close a batch: archive its temporary files and drop its rows.
    /// Closing an unknown or already-closed batch is a no-op.
    pub fn close(&mut self, batch: BatchId) -> Result<()> {
        let jobs = self.store.jobs_in_batch(batch)?;
        let Some(first) = jobs.first() else {
            debug!(batch, "close of an empty batch, nothing to do");
            return Ok(());
        };
        self.guard.check(first.owner)?;

        let files = self.store.files_in_batch(batch)?;
        internal::archive_temporaries(&files, &self.cfg.dirs.archive, batch)?;
        self.store.delete_batch(batch)?;
        info!(batch, "batch closed");
        Ok(())
    }

    /// Run one recombination (or other internal) job on demand.
    pub fn recombine(&mut self, job: JobId) -> Result<()> {
        let job = self.store.job(job)?;
        self.guard.check(job.owner)?;
        if !job.app.is_internal() {
            return Err(GridError::InvalidAppId(format!(
                "job {} runs {}, which has no local execution",
                job.id,
                job.app.name()
            )));
        }
        self.run_internal_job(&job)?;
        self.advance_batch(job.batch)
    }

    // ---- transitions --------------------------------------------------

    fn run_internal_job(&mut self, job: &PersistedJob) -> Result<()> {
        self.store.update_state(job.id, JobState::Running)?;
        let files = self.store.files_of(job.id)?;
        match internal::run(job, &files) {
            Ok(()) => self.store.update_state(job.id, JobState::Success),
            Err(e) => {
                error!(job = job.id, error = %e, "internal job failed");
                self.store.update_state(job.id, JobState::Invalid)?;
                self.invalidate_descendants(job.id)
            }
        }
    }

    /// Stage a ready job's inputs and hand it to the backend. A failure
    /// here is isolated: the job stays waiting and its siblings proceed.
    fn dispatch_job(&mut self, job: &PersistedJob) -> Result<()> {
        let files = self.store.files_of(job.id)?;

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for file in &files {
            let staged = StagedFile {
                alias: file.alias.clone(),
                path: file.relative_path(),
            };
            if file.kind.is_output() {
                outputs.push(staged);
            } else {
                if !std::path::Path::new(&staged.path).exists() {
                    error!(
                        job = job.id,
                        file = %staged.path,
                        "input missing at dispatch time, job stays waiting"
                    );
                    self.stash_inputs(&inputs);
                    return Ok(());
                }
                inputs.push(staged);
            }
        }

        let unit = DispatchUnit {
            job: job.id,
            name: unit_name(job.app, job.id),
            app: job.app,
            arguments: job.arguments.clone(),
            inputs,
            outputs,
            estimate: job.estimate,
        };
        if let Err(e) = self.backend.dispatch(&unit) {
            error!(job = job.id, error = %e, "dispatch failed, job stays waiting");
            return Ok(());
        }
        self.store.update_state(job.id, JobState::Running)
    }

    /// Copy the inputs that did stage into the configured error directory
    /// for inspection. Best effort only.
    fn stash_inputs(&self, inputs: &[StagedFile]) {
        let Some(dir) = &self.cfg.dirs.error else {
            return;
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create error directory");
            return;
        }
        for input in inputs {
            let src = std::path::Path::new(&input.path);
            let Some(name) = src.file_name() else {
                continue;
            };
            if let Err(e) = std::fs::copy(src, dir.join(name)) {
                warn!(file = %input.path, error = %e, "cannot stash staged input");
            }
        }
    }

    /// Mark every non-terminal descendant of `job` invalid.
    fn invalidate_descendants(&mut self, job: JobId) -> Result<()> {
        for child in self.store.children(job)? {
            let state = self.store.job(child)?.state;
            if !state.is_terminal() {
                debug!(job = child, "invalidated by ancestor failure");
                self.store.update_state(child, JobState::Invalid)?;
                self.invalidate_descendants(child)?;
            }
        }
        Ok(())
    }

    fn cascade_invalid(&mut self, batch: BatchId) -> Result<()> {
        for job in self.store.jobs_in_batch(batch)? {
            if job.state == JobState::Invalid {
                self.invalidate_descendants(job.id)?;
            }
        }
        Ok(())
    }

    fn close_if_finished(&mut self, batch: BatchId) -> Result<()> {
        let jobs = self.store.jobs_in_batch(batch)?;
        if !jobs.is_empty() && jobs.iter().all(|j| j.state.is_terminal()) {
            info!(batch, "all jobs terminal, closing batch");
            return self.close(batch);
        }
        Ok(())
    }
}
