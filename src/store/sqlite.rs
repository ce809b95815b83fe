// src/store/sqlite.rs

//! SQLite implementation of the job store.

use std::path::Path;

use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::errors::{GridError, Result};
use crate::files::FileKind;
use crate::graph::AppKind;
use crate::store::{
    BatchId, JobId, JobState, JobStore, NewJob, PersistedFile, PersistedJob,
};

const SQL_SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS jobs (
        id              INTEGER PRIMARY KEY,
        batch           INTEGER NOT NULL,
        local_id        INTEGER NOT NULL,
        app             INTEGER NOT NULL,
        state           INTEGER NOT NULL,
        owner           INTEGER NOT NULL,
        prereq          INTEGER,
        estimate        REAL NOT NULL,
        snapshot_offset INTEGER NOT NULL,
        arguments       TEXT NOT NULL,
        submit_time     TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_batch ON jobs(batch)",
    "CREATE TABLE IF NOT EXISTS files (
        id            INTEGER PRIMARY KEY,
        job_id        INTEGER NOT NULL REFERENCES jobs(id),
        param         TEXT NOT NULL,
        name          TEXT NOT NULL,
        alias         TEXT NOT NULL,
        kind          INTEGER NOT NULL,
        subdirectory  TEXT,
        parent_job_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_files_job ON files(job_id)",
];

const JOB_COLUMNS: &str =
    "id, batch, local_id, app, state, owner, prereq, estimate, snapshot_offset, \
     arguments, submit_time";

const READY_SQL: &str = "\
    SELECT id, batch, local_id, app, state, owner, prereq, estimate, snapshot_offset, \
           arguments, submit_time
    FROM jobs
    WHERE batch = ?1
      AND state = 0
      AND (prereq IS NULL
           OR EXISTS (SELECT 1 FROM jobs p WHERE p.id = jobs.prereq AND p.state = 2))
      AND NOT EXISTS (
          SELECT 1 FROM files f
          JOIN jobs p ON p.id = f.parent_job_id
          WHERE f.job_id = jobs.id
            AND f.kind IN (1, 3)
            AND p.state != 2)
    ORDER BY id";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening job store");
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory store, handy under test.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        for stmt in SQL_SCHEMA {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn })
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedJob> {
    let app_code: i64 = row.get(3)?;
    let state_code: i64 = row.get(4)?;
    Ok(PersistedJob {
        id: row.get(0)?,
        batch: row.get(1)?,
        local_id: row.get(2)?,
        app: AppKind::from_code(app_code).ok_or_else(|| bad_code(3, app_code))?,
        state: JobState::from_code(state_code).ok_or_else(|| bad_code(4, state_code))?,
        owner: row.get(5)?,
        prereq: row.get(6)?,
        estimate: row.get(7)?,
        snapshot_offset: row.get::<_, i64>(8)? as u64,
        arguments: row.get(9)?,
        submit_time: row.get(10)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedFile> {
    let kind_code: i64 = row.get(5)?;
    Ok(PersistedFile {
        id: row.get(0)?,
        job: row.get(1)?,
        param: row.get(2)?,
        name: row.get(3)?,
        alias: row.get(4)?,
        kind: FileKind::from_code(kind_code).ok_or_else(|| bad_code(5, kind_code))?,
        subdirectory: row.get(6)?,
        parent: row.get(7)?,
    })
}

fn bad_code(column: usize, code: i64) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Integer,
        format!("unknown code {code}").into(),
    )
}

impl JobStore for SqliteStore {
    fn next_batch_id(&self) -> Result<BatchId> {
        let id = self.conn.query_row(
            "SELECT COALESCE(MAX(batch), 0) + 1 FROM jobs",
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO jobs (batch, local_id, app, state, owner, prereq, estimate, \
             snapshot_offset, arguments, submit_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) RETURNING id",
        )?;
        let id = stmt.query_row(
            params![
                job.batch,
                job.local_id,
                job.app.code(),
                job.state.code(),
                job.owner,
                job.prereq,
                job.estimate,
                job.snapshot_offset as i64,
                job.arguments,
                job.submit_time,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn insert_file(&self, file: &PersistedFile) -> Result<i64> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO files (job_id, param, name, alias, kind, subdirectory, \
             parent_job_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id",
        )?;
        let id = stmt.query_row(
            params![
                file.job,
                file.param,
                file.name,
                file.alias,
                file.kind.code(),
                file.subdirectory,
                file.parent,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn job(&self, id: JobId) -> Result<PersistedJob> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
        let jobs: Vec<PersistedJob> = stmt
            .query_map(params![id], job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        match jobs.len() {
            0 => Err(GridError::NotAProcess(id)),
            1 => Ok(jobs.into_iter().next().ok_or(GridError::NotAProcess(id))?),
            _ => Err(GridError::MultipleRows(id)),
        }
    }

    fn jobs_in_batch(&self, batch: BatchId) -> Result<Vec<PersistedJob>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE batch = ?1 ORDER BY id"
        ))?;
        let jobs = stmt
            .query_map(params![batch], job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(jobs)
    }

    fn query_by_state(&self, state: JobState) -> Result<Vec<PersistedJob>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ?1 ORDER BY id"
        ))?;
        let jobs = stmt
            .query_map(params![state.code()], job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(jobs)
    }

    fn children(&self, id: JobId) -> Result<Vec<JobId>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM jobs WHERE prereq = ?1
             UNION
             SELECT job_id FROM files WHERE parent_job_id = ?1 AND kind IN (1, 3)
             ORDER BY 1",
        )?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    }

    fn ready_jobs(&self, batch: BatchId) -> Result<Vec<PersistedJob>> {
        let mut stmt = self.conn.prepare_cached(READY_SQL)?;
        let jobs = stmt
            .query_map(params![batch], job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(jobs)
    }

    fn update_state(&self, id: JobId, state: JobState) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE jobs SET state = ?2 WHERE id = ?1")?;
        let changed = stmt.execute(params![id, state.code()])?;
        if changed == 0 {
            return Err(GridError::NotAProcess(id));
        }
        Ok(())
    }

    fn files_of(&self, job: JobId) -> Result<Vec<PersistedFile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, job_id, param, name, alias, kind, subdirectory, parent_job_id \
             FROM files WHERE job_id = ?1 ORDER BY id",
        )?;
        let files = stmt
            .query_map(params![job], file_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(files)
    }

    fn files_in_batch(&self, batch: BatchId) -> Result<Vec<PersistedFile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.id, f.job_id, f.param, f.name, f.alias, f.kind, f.subdirectory, \
             f.parent_job_id \
             FROM files f JOIN jobs j ON j.id = f.job_id \
             WHERE j.batch = ?1 ORDER BY f.id",
        )?;
        let files = stmt
            .query_map(params![batch], file_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(files)
    }

    fn delete_batch(&self, batch: BatchId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM files WHERE job_id IN (SELECT id FROM jobs WHERE batch = ?1)",
            params![batch],
        )?;
        let removed = self
            .conn
            .execute("DELETE FROM jobs WHERE batch = ?1", params![batch])?;
        debug!(batch, jobs = removed, "deleted batch rows");
        Ok(())
    }

    fn finished_batches(&self) -> Result<Vec<BatchId>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT batch FROM jobs \
             WHERE batch NOT IN (SELECT batch FROM jobs WHERE state IN (0, 1)) \
             ORDER BY batch",
        )?;
        let batches = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(batches)
    }

    fn distinct_batches(&self) -> Result<Vec<BatchId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT batch FROM jobs ORDER BY batch")?;
        let batches = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(batch: BatchId, local_id: u32, prereq: Option<JobId>) -> NewJob {
        NewJob {
            batch,
            local_id,
            app: AppKind::Simulate,
            state: JobState::Waiting,
            owner: 1000,
            prereq,
            estimate: 11_000.0,
            snapshot_offset: 0,
            arguments: String::new(),
            submit_time: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn input_file(job: JobId, name: &str, parent: Option<JobId>) -> PersistedFile {
        PersistedFile {
            id: 0,
            job,
            param: "coords".to_string(),
            name: name.to_string(),
            alias: name.to_string(),
            kind: FileKind::TemporaryInput,
            subdirectory: None,
            parent,
        }
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_job(&new_job(1, 1, None)).unwrap();
        let job = store.job(id).unwrap();
        assert_eq!(job.batch, 1);
        assert_eq!(job.state, JobState::Waiting);
        assert!(matches!(store.job(999), Err(GridError::NotAProcess(999))));
    }

    #[test]
    fn ready_requires_successful_prereq() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_job(&new_job(1, 1, None)).unwrap();
        let b = store.insert_job(&new_job(1, 2, Some(a))).unwrap();

        let ready: Vec<JobId> = store.ready_jobs(1).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ready, vec![a]);

        store.update_state(a, JobState::Success).unwrap();
        let ready: Vec<JobId> = store.ready_jobs(1).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ready, vec![b]);
    }

    #[test]
    fn ready_requires_all_file_producers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let p1 = store.insert_job(&new_job(1, 1, None)).unwrap();
        let p2 = store.insert_job(&new_job(1, 2, None)).unwrap();
        let consumer = store.insert_job(&new_job(1, 3, None)).unwrap();
        store
            .insert_file(&input_file(consumer, "part_1", Some(p1)))
            .unwrap();
        store
            .insert_file(&input_file(consumer, "part_2", Some(p2)))
            .unwrap();

        store.update_state(p1, JobState::Success).unwrap();
        // one producer still pending keeps the consumer out
        let ready: Vec<JobId> = store.ready_jobs(1).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ready, vec![p2]);

        store.update_state(p2, JobState::Success).unwrap();
        let ready: Vec<JobId> = store.ready_jobs(1).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ready, vec![consumer]);
    }

    #[test]
    fn children_follow_both_edge_kinds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_job(&new_job(1, 1, None)).unwrap();
        let b = store.insert_job(&new_job(1, 2, Some(a))).unwrap();
        let c = store.insert_job(&new_job(1, 3, None)).unwrap();
        store.insert_file(&input_file(c, "out_1", Some(a))).unwrap();

        assert_eq!(store.children(a).unwrap(), vec![b, c]);
        assert!(store.children(c).unwrap().is_empty());
    }

    #[test]
    fn finished_batches_need_every_job_terminal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_job(&new_job(1, 1, None)).unwrap();
        let b = store.insert_job(&new_job(1, 2, None)).unwrap();
        store.insert_job(&new_job(2, 1, None)).unwrap();

        store.update_state(a, JobState::Success).unwrap();
        assert!(store.finished_batches().unwrap().is_empty());

        store.update_state(b, JobState::Invalid).unwrap();
        assert_eq!(store.finished_batches().unwrap(), vec![1]);
        assert_eq!(store.distinct_batches().unwrap(), vec![1, 2]);
    }

    #[test]
    fn delete_batch_removes_jobs_and_files() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_job(&new_job(1, 1, None)).unwrap();
        store.insert_file(&input_file(a, "x", None)).unwrap();
        let other = store.insert_job(&new_job(2, 1, None)).unwrap();

        store.delete_batch(1).unwrap();
        assert!(matches!(store.job(a), Err(GridError::NotAProcess(_))));
        assert!(store.job(other).is_ok());
        // deleting again is a no-op
        store.delete_batch(1).unwrap();
    }

    #[test]
    fn batch_ids_are_monotonic() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.next_batch_id().unwrap(), 1);
        store.insert_job(&new_job(5, 1, None)).unwrap();
        assert_eq!(store.next_batch_id().unwrap(), 6);
    }
}
