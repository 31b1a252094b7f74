//! Remote metadata from `yt-dlp -J` turned into selectable variants, and the
//! deterministic yt-dlp argument list for a download job.

use crate::cmd;
use crate::config::EngineConfig;
use crate::job::DownloadParams;
use crate::tools::{Tool, ToolPaths};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const DEFAULT_AUDIO_LANGUAGE: &str = "default";
const BEST_AUDIO_SELECTOR: &str = "bestaudio";
const BEST_FALLBACK_SELECTOR: &str = "bestvideo+bestaudio/best";
const PASSWORD_MARKERS: &[&str] = &[
    "--video-password",
    "protected by a password",
    "password protected",
    "requires a password",
    "wrong password",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoVariant {
    pub format_id: String,
    pub ext: Option<String>,
    pub width: Option<u32>,
    pub height: u32,
    pub resolution: String,
    pub fps: Option<f64>,
    pub codec: String,
    pub approx_size_bytes: Option<u64>,
    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioVariant {
    pub format_id: String,
    pub ext: Option<String>,
    pub codec: String,
    /// kbit/s; 0 when yt-dlp did not report one.
    pub bitrate_kbps: f64,
    pub approx_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrack {
    pub language: String,
    pub variants: Vec<AudioVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteMediaInfo {
    pub url: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration_secs: Option<f64>,
    pub thumbnail: Option<String>,
    pub video_variants: Vec<VideoVariant>,
    pub audio_tracks: Vec<AudioTrack>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct YtDlpFormat {
    #[serde(default)]
    format_id: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

impl YtDlpFormat {
    fn codec(value: &Option<String>) -> Option<&str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "none")
    }

    fn video_codec(&self) -> Option<&str> {
        Self::codec(&self.vcodec)
    }

    fn audio_codec(&self) -> Option<&str> {
        Self::codec(&self.acodec)
    }

    fn approx_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Accepts only absolute http(s) URLs with a host.
pub fn normalize_source_url(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidParams("url is required".to_string()));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|e| EngineError::InvalidParams(format!("invalid url {trimmed:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(EngineError::InvalidParams(format!(
            "unsupported url scheme {:?}; only http/https are allowed",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(EngineError::InvalidParams(format!("url is missing a host: {trimmed}")));
    }
    Ok(trimmed.to_string())
}

/// Scheme and host only, so credentials and tokens in the query stay out of logs.
pub fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value.trim()) {
        Ok(url) => format!("{}://{}/...", url.scheme(), url.host_str().unwrap_or("unknown-host")),
        Err(_) => "[invalid-url]".to_string(),
    }
}

fn resolve_video_variants(formats: &[YtDlpFormat]) -> Vec<VideoVariant> {
    let mut variants: Vec<VideoVariant> = formats
        .iter()
        .filter_map(|f| {
            let codec = f.video_codec()?;
            let height = f.height.filter(|h| *h > 0)?;
            let format_id = f.format_id.clone()?;
            let resolution = match f.width {
                Some(w) if w > 0 => format!("{w}x{height}"),
                _ => format!("{height}p"),
            };
            Some(VideoVariant {
                format_id,
                ext: f.ext.clone(),
                width: f.width,
                height,
                resolution,
                fps: f.fps,
                codec: codec.to_string(),
                approx_size_bytes: f.approx_size(),
                has_audio: f.audio_codec().is_some(),
            })
        })
        .collect();
    // sort_by is stable: equal heights keep yt-dlp's order.
    variants.sort_by(|a, b| b.height.cmp(&a.height));
    variants
}

fn resolve_audio_variants(formats: &[YtDlpFormat]) -> Vec<(String, AudioVariant)> {
    let mut variants: Vec<(String, AudioVariant)> = formats
        .iter()
        .filter(|f| f.video_codec().is_none())
        .filter_map(|f| {
            let codec = f.audio_codec()?;
            let format_id = f.format_id.clone()?;
            let language = f
                .language
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_AUDIO_LANGUAGE)
                .to_string();
            Some((
                language,
                AudioVariant {
                    format_id,
                    ext: f.ext.clone(),
                    codec: codec.to_string(),
                    bitrate_kbps: f.abr.or(f.tbr).filter(|v| v.is_finite()).unwrap_or(0.0),
                    approx_size_bytes: f.approx_size(),
                },
            ))
        })
        .collect();
    variants.sort_by(|(_, a), (_, b)| b.bitrate_kbps.total_cmp(&a.bitrate_kbps));
    variants
}

/// Groups bitrate-sorted variants by language. Track order follows the first
/// appearance of each language in the original format list.
fn group_audio_tracks(formats: &[YtDlpFormat]) -> Vec<AudioTrack> {
    let mut tracks: Vec<AudioTrack> = Vec::new();
    for f in formats
        .iter()
        .filter(|f| f.video_codec().is_none() && f.audio_codec().is_some() && f.format_id.is_some())
    {
        let language = f
            .language
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_AUDIO_LANGUAGE);
        if !tracks.iter().any(|t| t.language == language) {
            tracks.push(AudioTrack {
                language: language.to_string(),
                variants: Vec::new(),
            });
        }
    }
    for (language, variant) in resolve_audio_variants(formats) {
        if let Some(track) = tracks.iter_mut().find(|t| t.language == language) {
            track.variants.push(variant);
        }
    }
    tracks
}

/// Parses the JSON document printed by `yt-dlp -J`.
pub fn parse_media_info(url: &str, json: &[u8]) -> Result<RemoteMediaInfo> {
    let info: YtDlpInfo = serde_json::from_slice(json)
        .map_err(|e| EngineError::MetadataFetchFailed(format!("unreadable yt-dlp output: {e}")))?;
    Ok(RemoteMediaInfo {
        url: info.webpage_url.clone().unwrap_or_else(|| url.to_string()),
        title: info
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "untitled".to_string()),
        uploader: info.uploader.clone(),
        duration_secs: info.duration.filter(|d| d.is_finite() && *d > 0.0),
        thumbnail: info.thumbnail.clone(),
        video_variants: resolve_video_variants(&info.formats),
        audio_tracks: group_audio_tracks(&info.formats),
    })
}

/// Maps a failed metadata fetch to an error. A password prompt is reported
/// separately so the caller can ask for one and try again.
pub fn classify_fetch_failure(url: &str, stderr: &str) -> EngineError {
    let lower = stderr.to_ascii_lowercase();
    if PASSWORD_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return EngineError::PasswordRequired {
            url: url.to_string(),
        };
    }
    let tail = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("yt-dlp failed without output");
    EngineError::MetadataFetchFailed(tail.to_string())
}

pub fn fetch_media_info(
    tools: &ToolPaths,
    url: &str,
    password: Option<&str>,
) -> Result<RemoteMediaInfo> {
    let url = normalize_source_url(url)?;
    let ytdlp = tools.require(Tool::YtDlp)?;

    let mut args: Vec<String> = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
    ];
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        args.push("--video-password".to_string());
        args.push(password.to_string());
    }
    args.push(url.clone());

    tracing::info!(url = %redact_url_for_log(&url), "fetching media info");
    let output = cmd::command(ytdlp)
        .args(&args)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolUnavailable {
                tool: Tool::YtDlp.name().to_string(),
            },
            _ => EngineError::MetadataFetchFailed(e.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let err = classify_fetch_failure(&url, &stderr);
        tracing::warn!(url = %redact_url_for_log(&url), error = %err, "media info fetch failed");
        return Err(err);
    }
    parse_media_info(&url, &output.stdout)
}

/// Full yt-dlp argument list for a download job, URL last.
pub fn build_download_args(
    params: &DownloadParams,
    config: &EngineConfig,
    local_ffmpeg: Option<&Path>,
) -> Vec<String> {
    let video = non_empty(params.video_format_id.as_deref());
    let audio = non_empty(params.audio_format_id.as_deref());

    let mut args: Vec<String> = Vec::new();
    let extract_audio = |args: &mut Vec<String>, selector: &str| {
        args.extend([
            "-f".to_string(),
            selector.to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            config.download_audio_format.clone(),
            "--audio-quality".to_string(),
            config.download_audio_quality.clone(),
        ]);
    };

    match (params.audio_only, video, audio) {
        (true, _, audio) => extract_audio(&mut args, audio.unwrap_or(BEST_AUDIO_SELECTOR)),
        (false, Some(v), Some(a)) => args.extend([
            "-f".to_string(),
            format!("{v}+{a}"),
            "--merge-output-format".to_string(),
            config.download_merge_format.clone(),
        ]),
        (false, Some(v), None) => args.extend(["-f".to_string(), v.to_string()]),
        (false, None, Some(a)) => extract_audio(&mut args, a),
        (false, None, None) => args.extend([
            "-f".to_string(),
            BEST_FALLBACK_SELECTOR.to_string(),
            "--merge-output-format".to_string(),
            config.download_merge_format.clone(),
        ]),
    }

    if let Some(ffmpeg) = local_ffmpeg {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.to_string_lossy().to_string());
    }
    if let Some(password) = params.password.as_deref().filter(|p| !p.is_empty()) {
        args.push("--video-password".to_string());
        args.push(password.to_string());
    }

    args.extend([
        "--newline".to_string(),
        // `--print` implies `--quiet`; keep the progress lines.
        "--progress".to_string(),
        "--no-playlist".to_string(),
        "--no-part".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-P".to_string(),
        params.output_folder.to_string_lossy().to_string(),
        "-o".to_string(),
        format!("{}.%(ext)s", params.filename.trim()),
        params.url.trim().to_string(),
    ]);
    args
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
