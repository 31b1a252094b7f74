use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Creation-ordered job identifier. Ids are never reused within one store.
pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Merge,
    ExtractAudio,
    RemoveAudio,
    Download,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Merge => "merge",
            JobKind::ExtractAudio => "extract_audio",
            JobKind::RemoveAudio => "remove_audio",
            JobKind::Download => "download",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "merge" => Some(JobKind::Merge),
            "extract_audio" => Some(JobKind::ExtractAudio),
            "remove_audio" => Some(JobKind::RemoveAudio),
            "download" => Some(JobKind::Download),
            _ => None,
        }
    }

    /// Past-tense label used in notifications and history.
    pub fn done_label(&self) -> &'static str {
        match self {
            JobKind::Merge => "Merged",
            JobKind::ExtractAudio => "Audio extracted",
            JobKind::RemoveAudio => "Audio removed",
            JobKind::Download => "Downloaded",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeParams {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractAudioParams {
    pub video_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveAudioParams {
    pub video_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadParams {
    pub url: String,
    pub video_format_id: Option<String>,
    pub audio_format_id: Option<String>,
    pub output_folder: PathBuf,
    /// File stem; yt-dlp appends the container extension.
    pub filename: String,
    pub audio_only: bool,
    /// Never persisted: a reloaded job has to be re-authorized.
    #[serde(skip)]
    pub password: Option<String>,
    /// Duration from the metadata fetch, used for progress when the
    /// downloader only reports elapsed time.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Kind-specific job input. The variant is the job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    Merge(MergeParams),
    ExtractAudio(ExtractAudioParams),
    RemoveAudio(RemoveAudioParams),
    Download(DownloadParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Merge(_) => JobKind::Merge,
            JobParams::ExtractAudio(_) => JobKind::ExtractAudio,
            JobParams::RemoveAudio(_) => JobKind::RemoveAudio,
            JobParams::Download(_) => JobKind::Download,
        }
    }

    /// Path that the job's duration is probed from, if it has a local input.
    pub fn primary_input(&self) -> Option<&Path> {
        match self {
            JobParams::Merge(p) => Some(&p.video_path),
            JobParams::ExtractAudio(p) => Some(&p.video_path),
            JobParams::RemoveAudio(p) => Some(&p.video_path),
            JobParams::Download(_) => None,
        }
    }

    /// Where the result is expected to land: a file for local jobs, a folder for downloads.
    pub fn output_target(&self) -> &Path {
        match self {
            JobParams::Merge(p) => &p.output_path,
            JobParams::ExtractAudio(p) => &p.output_path,
            JobParams::RemoveAudio(p) => &p.output_path,
            JobParams::Download(p) => &p.output_folder,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            JobParams::Merge(p) => {
                require_path("video_path", &p.video_path)?;
                require_path("audio_path", &p.audio_path)?;
                require_path("output_path", &p.output_path)?;
                require_distinct_output(&p.output_path, &[&p.video_path, &p.audio_path])
            }
            JobParams::ExtractAudio(p) => {
                require_path("video_path", &p.video_path)?;
                require_path("output_path", &p.output_path)?;
                require_distinct_output(&p.output_path, &[&p.video_path])
            }
            JobParams::RemoveAudio(p) => {
                require_path("video_path", &p.video_path)?;
                require_path("output_path", &p.output_path)?;
                require_distinct_output(&p.output_path, &[&p.video_path])
            }
            JobParams::Download(p) => {
                crate::formats::normalize_source_url(&p.url)?;
                require_path("output_folder", &p.output_folder)?;
                validate_filename(&p.filename)?;
                for (field, value) in [
                    ("video_format_id", &p.video_format_id),
                    ("audio_format_id", &p.audio_format_id),
                ] {
                    if matches!(value, Some(v) if v.trim().is_empty()) {
                        return Err(EngineError::InvalidParams(format!(
                            "{field} must not be empty when provided"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

fn require_path(field: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Err(EngineError::InvalidParams(format!("{field} is required")));
    }
    Ok(())
}

fn require_distinct_output(output: &Path, inputs: &[&Path]) -> Result<()> {
    if inputs.iter().any(|input| *input == output) {
        return Err(EngineError::InvalidParams(format!(
            "output path must differ from the input: {}",
            output.display()
        )));
    }
    Ok(())
}

fn validate_filename(filename: &str) -> Result<()> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidParams("filename is required".to_string()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == "." || trimmed == ".." {
        return Err(EngineError::InvalidParams(format!(
            "filename must be a bare name, got {trimmed:?}"
        )));
    }
    Ok(())
}

/// One queued unit of media work.
///
/// `params` never changes after construction. Lifecycle fields move only
/// through the crate-internal transition methods, which enforce
/// Pending → Processing → {Completed | Failed}.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: JobId,
    params: JobParams,
    state: JobState,
    progress: u8,
    error: Option<String>,
    output_location: Option<PathBuf>,
    created_at_ms: i64,
    started_at_ms: Option<i64>,
    finished_at_ms: Option<i64>,
}

impl Job {
    pub(crate) fn new(id: JobId, params: JobParams) -> Self {
        Self {
            id,
            params,
            state: JobState::Pending,
            progress: 0,
            error: None,
            output_location: None,
            created_at_ms: now_ms(),
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    /// Rebuilds a job from its persisted row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: JobId,
        params: JobParams,
        state: JobState,
        progress: u8,
        error: Option<String>,
        output_location: Option<PathBuf>,
        created_at_ms: i64,
        started_at_ms: Option<i64>,
        finished_at_ms: Option<i64>,
    ) -> Self {
        Self {
            id,
            params,
            state,
            progress: progress.min(100),
            error,
            output_location,
            created_at_ms,
            started_at_ms,
            finished_at_ms,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn output_location(&self) -> Option<&Path> {
        self.output_location.as_deref()
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub fn finished_at_ms(&self) -> Option<i64> {
        self.finished_at_ms
    }

    fn expect_state(&self, expected: JobState) -> Result<()> {
        if self.state != expected {
            return Err(EngineError::InvalidState {
                job_id: self.id,
                state: self.state,
            });
        }
        Ok(())
    }

    pub(crate) fn begin_processing(&mut self) -> Result<()> {
        self.expect_state(JobState::Pending)?;
        self.state = JobState::Processing;
        self.progress = 0;
        self.started_at_ms = Some(now_ms());
        Ok(())
    }

    /// Raises progress; lower or equal values are ignored. Returns whether it changed.
    pub(crate) fn record_progress(&mut self, percent: u8) -> bool {
        if self.state != JobState::Processing {
            return false;
        }
        let percent = percent.min(100);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    pub(crate) fn complete(&mut self, output_location: PathBuf) -> Result<()> {
        self.expect_state(JobState::Processing)?;
        self.state = JobState::Completed;
        self.progress = 100;
        self.error = None;
        self.output_location = Some(output_location);
        self.finished_at_ms = Some(now_ms());
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.expect_state(JobState::Processing)?;
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.finished_at_ms = Some(now_ms());
        Ok(())
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
