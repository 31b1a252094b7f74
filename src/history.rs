use crate::db;
use crate::job::{now_ms, JobKind};
use crate::paths::AppPaths;
use crate::sink::HistorySink;
use crate::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentFile {
    pub path: PathBuf,
    pub kind: JobKind,
    pub recorded_at_ms: i64,
}

/// Most recent outputs, newest first, one entry per path.
pub struct RecentFiles {
    conn: Mutex<Connection>,
    limit: usize,
}

impl RecentFiles {
    pub fn open(paths: &AppPaths, limit: usize) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_migrated(paths)?),
            limit: limit.max(1),
        })
    }

    /// Records `output` as the newest entry. Re-recording a path replaces its
    /// row so the fresh rowid orders it first.
    pub fn add(&self, output: &Path, kind: JobKind) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let path = output.to_string_lossy().to_string();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM recent_file WHERE path=?1", params![path])?;
        tx.execute(
            "INSERT INTO recent_file(path, kind, recorded_at_ms) VALUES (?1, ?2, ?3)",
            params![path, kind.as_str(), now_ms()],
        )?;
        tx.execute(
            "DELETE FROM recent_file WHERE rowid NOT IN
             (SELECT rowid FROM recent_file ORDER BY rowid DESC LIMIT ?1)",
            params![self.limit as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<RecentFile>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT path, kind, recorded_at_ms FROM recent_file
             ORDER BY rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![self.limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(path, kind, recorded_at_ms)| {
                Some(RecentFile {
                    path: PathBuf::from(path),
                    kind: JobKind::from_str(&kind)?,
                    recorded_at_ms,
                })
            })
            .collect())
    }

    pub fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conn.execute("DELETE FROM recent_file", [])?)
    }
}

impl HistorySink for RecentFiles {
    fn record(&self, output: &Path, kind: JobKind) {
        if let Err(err) = self.add(output, kind) {
            tracing::warn!(output = %output.display(), error = %err, "recording recent file failed");
        }
    }
}
