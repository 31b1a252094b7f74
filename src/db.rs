use crate::paths::AppPaths;
use crate::{EngineError, Result};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::time::Duration;

const SCHEMA_VERSION: i64 = 1;

pub fn open(paths: &AppPaths) -> Result<Connection> {
    paths.ensure_dirs()?;

    let conn = Connection::open_with_flags(
        paths.db_path(),
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;

    conn.busy_timeout(Duration::from_secs(10))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job (
  id INTEGER PRIMARY KEY,
  kind TEXT NOT NULL,
  state TEXT NOT NULL,
  progress INTEGER NOT NULL DEFAULT 0,
  error TEXT,
  params_json TEXT NOT NULL,
  output_location TEXT,
  created_at_ms INTEGER NOT NULL,
  started_at_ms INTEGER,
  finished_at_ms INTEGER
);

CREATE INDEX IF NOT EXISTS idx_job_state ON job(state, id);

CREATE TABLE IF NOT EXISTS recent_file (
  path TEXT PRIMARY KEY,
  kind TEXT NOT NULL,
  recorded_at_ms INTEGER NOT NULL
);
"#,
    )?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        _ => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
    }

    Ok(())
}

pub fn open_migrated(paths: &AppPaths) -> Result<Connection> {
    let conn = open(paths)?;
    migrate(&conn)?;
    Ok(conn)
}

/// Exclusive claim on a base dir, held for as long as the value lives.
///
/// Backed by an open `BEGIN EXCLUSIVE` transaction on `db/engine.lock`.
/// SQLite releases it when the connection closes, including when the
/// process dies.
pub struct BaseDirLock {
    _conn: Connection,
}

pub fn lock_base_dir(paths: &AppPaths) -> Result<BaseDirLock> {
    paths.ensure_dirs()?;
    let lock_path = paths.engine_lock_path();
    let conn = Connection::open(&lock_path)?;
    conn.busy_timeout(Duration::ZERO)?;

    let claimed = conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS lease (id INTEGER PRIMARY KEY);
         BEGIN EXCLUSIVE;",
    );
    match claimed {
        Ok(()) => Ok(BaseDirLock { _conn: conn }),
        Err(err)
            if matches!(
                err.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ) =>
        {
            Err(EngineError::BaseDirInUse {
                path: paths.base_dir.display().to_string(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) trait OptionalRowExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalRowExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
