// src/store/mod.rs

//! Persistent job store.
//!
//! Once a batch is submitted the database is the only authority on job
//! state; every scheduler invocation re-reads it, decides, and writes the
//! transitions back. Nothing is cached between invocations.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::Result;
use crate::files::FileKind;
use crate::graph::{AppKind, LocalId};

pub type JobId = i64;
pub type BatchId = i64;
pub type Uid = u32;

/// Lifecycle state of a persisted job.
///
/// Waiting jobs become Running when dispatched (or are executed in place
/// for internal apps); terminal states are Success and Invalid. A job
/// whose ancestor goes Invalid is invalidated without ever running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobState {
    Waiting = 0,
    Running = 1,
    Success = 2,
    Invalid = 3,
}

impl JobState {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Waiting),
            1 => Some(Self::Running),
            2 => Some(Self::Success),
            3 => Some(Self::Invalid),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Invalid)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Success => "success",
            Self::Invalid => "invalid",
        }
    }
}

/// A job row as stored.
#[derive(Debug, Clone)]
pub struct PersistedJob {
    pub id: JobId,
    pub batch: BatchId,
    pub local_id: LocalId,
    pub app: AppKind,
    pub state: JobState,
    pub owner: Uid,
    pub prereq: Option<JobId>,
    pub estimate: f64,
    pub snapshot_offset: u64,
    /// Literal (non-file) arguments, pre-rendered.
    pub arguments: String,
    pub submit_time: String,
}

/// Insertion form of a job row; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub batch: BatchId,
    pub local_id: LocalId,
    pub app: AppKind,
    pub state: JobState,
    pub owner: Uid,
    pub prereq: Option<JobId>,
    pub estimate: f64,
    pub snapshot_offset: u64,
    pub arguments: String,
    pub submit_time: String,
}

/// A file row: one file role of one job.
#[derive(Debug, Clone)]
pub struct PersistedFile {
    pub id: i64,
    pub job: JobId,
    /// Argument name the job binds this file to.
    pub param: String,
    pub name: String,
    pub alias: String,
    pub kind: FileKind,
    pub subdirectory: Option<String>,
    /// Job that produces this file, for inputs of downstream jobs.
    pub parent: Option<JobId>,
}

impl PersistedFile {
    /// Path relative to the working directory.
    pub fn relative_path(&self) -> String {
        match &self.subdirectory {
            Some(dir) if !dir.is_empty() => format!("{dir}/{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Storage operations the scheduler needs.
pub trait JobStore {
    fn next_batch_id(&self) -> Result<BatchId>;
    fn insert_job(&self, job: &NewJob) -> Result<JobId>;
    fn insert_file(&self, file: &PersistedFile) -> Result<i64>;

    /// Fetch one job; a missing id is a [`crate::errors::GridError::NotAProcess`].
    fn job(&self, id: JobId) -> Result<PersistedJob>;
    fn jobs_in_batch(&self, batch: BatchId) -> Result<Vec<PersistedJob>>;
    fn query_by_state(&self, state: JobState) -> Result<Vec<PersistedJob>>;

    /// Direct dependents of `id`: prerequisite children plus consumers of
    /// its output files.
    fn children(&self, id: JobId) -> Result<Vec<JobId>>;

    /// Waiting jobs of `batch` whose prerequisite and whose input-file
    /// producers are all successful.
    fn ready_jobs(&self, batch: BatchId) -> Result<Vec<PersistedJob>>;

    fn update_state(&self, id: JobId, state: JobState) -> Result<()>;

    fn files_of(&self, job: JobId) -> Result<Vec<PersistedFile>>;
    fn files_in_batch(&self, batch: BatchId) -> Result<Vec<PersistedFile>>;

    fn delete_batch(&self, batch: BatchId) -> Result<()>;

    /// Batches with no waiting or running jobs left.
    fn finished_batches(&self) -> Result<Vec<BatchId>>;
    fn distinct_batches(&self) -> Result<Vec<BatchId>>;
}
