use crate::db::{self, OptionalRowExt};
use crate::job::{now_ms, Job, JobId, JobParams, JobState};
use crate::paths::AppPaths;
use crate::Result;
use rusqlite::{params, Connection};
use std::path::PathBuf;

pub const INTERRUPTED_ERROR: &str = "interrupted by app shutdown";
const NEXT_JOB_ID_KEY: &str = "next_job_id";

/// Write-through persistence for the job queue.
pub struct JobStore {
    conn: Connection,
}

struct JobRecord {
    id: i64,
    state: String,
    progress: i64,
    error: Option<String>,
    params_json: String,
    output_location: Option<String>,
    created_at_ms: i64,
    started_at_ms: Option<i64>,
    finished_at_ms: Option<i64>,
}

impl JobStore {
    pub fn open(paths: &AppPaths) -> Result<Self> {
        Ok(Self {
            conn: db::open_migrated(paths)?,
        })
    }

    /// Inserts the row and raises the id high-water mark past it, so the id
    /// is never handed out again even after the row is deleted.
    pub fn insert(&self, job: &Job) -> Result<()> {
        let params_json = serde_json::to_string(job.params())?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO job
             (id, kind, state, progress, error, params_json, output_location, created_at_ms, started_at_ms, finished_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id() as i64,
                job.kind().as_str(),
                job.state().as_str(),
                job.progress() as i64,
                job.error(),
                params_json,
                job.output_location().map(|p| p.to_string_lossy().to_string()),
                job.created_at_ms(),
                job.started_at_ms(),
                job.finished_at_ms(),
            ],
        )?;
        tx.execute(
            "INSERT INTO meta(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value
             WHERE CAST(meta.value AS INTEGER) < CAST(excluded.value AS INTEGER)",
            params![NEXT_JOB_ID_KEY, (job.id() + 1).to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// First id that no stored row, past or present, has used. Rows that
    /// fail to decode still count.
    pub fn next_job_id(&self) -> Result<JobId> {
        let recorded: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key=?1",
                params![NEXT_JOB_ID_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let recorded = recorded.and_then(|v| v.parse::<i64>().ok()).unwrap_or(1);
        let max_id: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM job", [], |row| row.get(0))?;
        let next = recorded.max(max_id.unwrap_or(0) + 1).max(1);
        Ok(JobId::try_from(next).unwrap_or(1))
    }

    /// Persists the lifecycle fields. Params are immutable and never rewritten.
    pub fn update(&self, job: &Job) -> Result<()> {
        self.conn.execute(
            "UPDATE job
             SET state=?1, progress=?2, error=?3, output_location=?4, started_at_ms=?5, finished_at_ms=?6
             WHERE id=?7",
            params![
                job.state().as_str(),
                job.progress() as i64,
                job.error(),
                job.output_location().map(|p| p.to_string_lossy().to_string()),
                job.started_at_ms(),
                job.finished_at_ms(),
                job.id() as i64,
            ],
        )?;
        Ok(())
    }

    pub fn update_progress(&self, job_id: JobId, progress: u8) -> Result<()> {
        self.conn.execute(
            "UPDATE job SET progress=?1 WHERE id=?2 AND state=?3",
            params![
                progress as i64,
                job_id as i64,
                JobState::Processing.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, job_id: JobId) -> Result<()> {
        self.conn
            .execute("DELETE FROM job WHERE id=?1", params![job_id as i64])?;
        Ok(())
    }

    pub fn delete_many(&mut self, job_ids: &[JobId]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0_usize;
        {
            let mut stmt = tx.prepare("DELETE FROM job WHERE id=?1")?;
            for id in job_ids {
                removed += stmt.execute(params![*id as i64])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Jobs left Processing by a previous process can never finish; they become Failed.
    pub fn mark_interrupted(&self) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE job SET state=?1, finished_at_ms=?2, error=?3 WHERE state=?4",
            params![
                JobState::Failed.as_str(),
                now_ms(),
                INTERRUPTED_ERROR,
                JobState::Processing.as_str()
            ],
        )?;
        Ok(updated)
    }

    /// All persisted jobs in id order. Rows that no longer parse are skipped
    /// with a warning.
    pub fn load_all(&self) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, state, progress, error, params_json, output_location, created_at_ms, started_at_ms, finished_at_ms
             FROM job ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(JobRecord {
                    id: row.get(0)?,
                    state: row.get(1)?,
                    progress: row.get(2)?,
                    error: row.get(3)?,
                    params_json: row.get(4)?,
                    output_location: row.get(5)?,
                    created_at_ms: row.get(6)?,
                    started_at_ms: row.get(7)?,
                    finished_at_ms: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            match record_to_job(&record) {
                Some(job) => jobs.push(job),
                None => tracing::warn!(job_id = record.id, "skipping unreadable job row"),
            }
        }
        Ok(jobs)
    }
}

fn record_to_job(record: &JobRecord) -> Option<Job> {
    let id = JobId::try_from(record.id).ok()?;
    let state = JobState::from_str(&record.state)?;
    let params: JobParams = serde_json::from_str(&record.params_json).ok()?;
    Some(Job::restore(
        id,
        params,
        state,
        record.progress.clamp(0, 100) as u8,
        record.error.clone(),
        record.output_location.as_ref().map(PathBuf::from),
        record.created_at_ms,
        record.started_at_ms,
        record.finished_at_ms,
    ))
}
