//! Per-job JSONL logs under `logs/jobs/<id>.jsonl`, with size rotation and
//! age/total-size pruning.

use crate::job::{now_ms, JobId};
use crate::paths::AppPaths;
use crate::Result;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const JOB_LOG_ROTATE_BYTES: u64 = 50 * 1024 * 1024;
const JOB_LOG_MAX_BACKUPS: usize = 3;
const JOB_LOG_MAX_AGE_DAYS: u64 = 30;
const JOB_LOG_TOTAL_CAP_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct JobLogRetentionPolicy {
    pub rotate_bytes: u64,
    pub max_backups: usize,
    pub max_age_days: u64,
    pub total_cap_bytes: u64,
}

impl Default for JobLogRetentionPolicy {
    fn default() -> Self {
        Self {
            rotate_bytes: JOB_LOG_ROTATE_BYTES,
            max_backups: JOB_LOG_MAX_BACKUPS,
            max_age_days: JOB_LOG_MAX_AGE_DAYS,
            total_cap_bytes: JOB_LOG_TOTAL_CAP_BYTES,
        }
    }
}

pub fn log_line(
    paths: &AppPaths,
    job_id: JobId,
    level: &str,
    event: &str,
    data: serde_json::Value,
) -> Result<()> {
    let line = serde_json::json!({
        "ts_ms": now_ms(),
        "job_id": job_id,
        "level": level,
        "event": event,
        "data": data
    })
    .to_string();

    let path = paths.job_log_path(job_id);
    std::fs::create_dir_all(paths.job_logs_dir())?;
    rotate_if_needed(&path, &JobLogRetentionPolicy::default())?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(format!("{line}\n").as_bytes())?;
    Ok(())
}

/// Job logs are diagnostics; a write failure is reported through tracing and
/// never fails the job.
pub fn log_line_best_effort(
    paths: &AppPaths,
    job_id: JobId,
    level: &str,
    event: &str,
    data: serde_json::Value,
) {
    if let Err(err) = log_line(paths, job_id, level, event, data) {
        tracing::warn!(job_id, event, error = %err, "job log write failed");
    }
}

fn rotate_if_needed(path: &Path, policy: &JobLogRetentionPolicy) -> Result<()> {
    let len = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return Ok(()),
    };
    if len < policy.rotate_bytes {
        return Ok(());
    }
    rotate_file_backups(path, policy.max_backups)?;
    Ok(())
}

fn rotate_file_backups(path: &Path, max_backups: usize) -> std::io::Result<()> {
    if max_backups == 0 {
        let _ = std::fs::remove_file(path);
        return Ok(());
    }

    for i in (1..=max_backups).rev() {
        let dst = path_with_suffix(path, &format!(".{i}"));
        let src = if i == 1 {
            path.to_path_buf()
        } else {
            path_with_suffix(path, &format!(".{}", i - 1))
        };

        if !src.exists() {
            continue;
        }
        if dst.exists() {
            let _ = std::fs::remove_file(&dst);
        }
        std::fs::rename(src, dst)?;
    }
    Ok(())
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = match path.file_name() {
        Some(n) => n.to_string_lossy().to_string(),
        None => suffix.to_string(),
    };
    path.with_file_name(format!("{file_name}{suffix}"))
}

/// Deletes logs older than the age limit, then the oldest ones until the
/// directory fits the total cap. Returns how many files were removed.
pub fn prune_job_logs(paths: &AppPaths, policy: &JobLogRetentionPolicy) -> Result<usize> {
    let dir = paths.job_logs_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(policy.max_age_days * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0_usize;
    let mut candidates: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = match entry {
            Ok(v) => v,
            Err(_) => continue,
        };
        let meta = match entry.metadata() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();

        if modified < cutoff {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
            continue;
        }
        candidates.push((path, modified, meta.len()));
    }

    candidates.sort_by_key(|(_, modified, _)| *modified);
    let mut total: u64 = candidates.iter().map(|(_, _, size)| *size).sum();
    for (path, _modified, size) in candidates {
        if total <= policy.total_cap_bytes {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
        total = total.saturating_sub(size);
    }

    Ok(removed)
}
