use crate::job::{JobId, JobState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("external tool is missing: {tool}")]
    ToolUnavailable { tool: String },

    #[error("invalid job parameters: {0}")]
    InvalidParams(String),

    #[error("job {job_id} is {state}; operation not allowed")]
    InvalidState { job_id: JobId, state: JobState },

    #[error("unknown job id: {0}")]
    UnknownJob(JobId),

    #[error("media probe failed: {0}")]
    ProbeFailed(String),

    #[error("source requires a password: {url}")]
    PasswordRequired { url: String },

    #[error("failed to fetch media info: {0}")]
    MetadataFetchFailed(String),

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ProcessFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("tool install failed: {0}")]
    InstallFailed(String),

    #[error("invalid config at {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    #[error("base dir is in use by another engine: {path}")]
    BaseDirInUse { path: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the caller can recover by prompting the user and retrying.
    pub fn is_password_required(&self) -> bool {
        matches!(self, EngineError::PasswordRequired { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
