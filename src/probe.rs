use crate::cmd;
use crate::tools::{Tool, ToolPaths};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the UI and the progress estimator need to know about a local file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration_secs: Option<f64>,
    pub container: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
    pub video_codec: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
}

pub fn probe(tools: &ToolPaths, input: &Path) -> Result<MediaProbe> {
    let ffprobe = tools.require(Tool::Ffprobe)?;
    let output = cmd::command(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolUnavailable {
                tool: Tool::Ffprobe.name().to_string(),
            },
            _ => EngineError::ProbeFailed(e.to_string()),
        })?;

    if !output.status.success() {
        return Err(EngineError::ProbeFailed(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_ffprobe_json(&output.stdout)
}

/// Duration only, for progress normalization. Failures are logged and turn
/// into "unknown".
pub fn probe_duration_best_effort(tools: &ToolPaths, input: &Path) -> Option<f64> {
    match probe(tools, input) {
        Ok(probe) => probe.duration_secs,
        Err(err) => {
            tracing::warn!(input = %input.display(), error = %err, "duration probe failed; progress will be coarse");
            None
        }
    }
}

pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<MediaProbe> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(bytes).map_err(|e| EngineError::ProbeFailed(e.to_string()))?;
    let streams = parsed.streams.unwrap_or_default();

    let container = parsed
        .format
        .as_ref()
        .and_then(|f| f.format_name.as_deref())
        .map(first_format_name);
    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);

    let video = streams
        .iter()
        .find(|st| st.codec_type.as_deref() == Some("video"));
    let audio = streams
        .iter()
        .find(|st| st.codec_type.as_deref() == Some("audio"));

    Ok(MediaProbe {
        duration_secs,
        container,
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        video_codec: video.and_then(|st| st.codec_name.clone()),
        width: video.and_then(|st| st.width),
        height: video.and_then(|st| st.height),
        audio_codec: audio.and_then(|st| st.codec_name.clone()),
        audio_bitrate: audio
            .and_then(|st| st.bit_rate.as_deref())
            .and_then(|v| v.trim().parse().ok()),
        sample_rate: audio
            .and_then(|st| st.sample_rate.as_deref())
            .and_then(|v| v.trim().parse().ok()),
    })
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<FfprobeStream>>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

fn first_format_name(value: &str) -> String {
    value.split(',').next().unwrap_or(value).trim().to_string()
}

fn parse_seconds(value: &str) -> Option<f64> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(seconds)
}
