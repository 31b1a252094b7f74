use crate::config::EngineConfig;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

const SYSTEM_BIN_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];
#[cfg(windows)]
const WINDOWS_FFMPEG_DIR: &str = "C:\\ffmpeg\\bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    YtDlp,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::YtDlp => "yt-dlp",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => "-version",
            Tool::YtDlp => "--version",
        }
    }

    fn bundled_path(&self, paths: &AppPaths) -> PathBuf {
        match self {
            Tool::Ffmpeg => paths.ffmpeg_bin_path(),
            Tool::Ffprobe => paths.ffprobe_bin_path(),
            Tool::YtDlp => paths.ytdlp_bin_path(),
        }
    }

    fn configured_path<'a>(&self, config: &'a EngineConfig) -> Option<&'a str> {
        match self {
            Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
            Tool::Ffprobe => config.ffprobe_path.as_deref(),
            Tool::YtDlp => config.ytdlp_path.as_deref(),
        }
        .map(str::trim)
        .filter(|v| !v.is_empty())
    }

    fn file_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.name())
        } else {
            self.name().to_string()
        }
    }
}

/// External binaries resolved once at engine start-up. A `None` entry means
/// every run that needs the tool fails with `ToolUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub ytdlp: Option<PathBuf>,
}

impl ToolPaths {
    pub fn locate(paths: &AppPaths, config: &EngineConfig) -> Self {
        let tools = Self {
            ffmpeg: locate_tool(Tool::Ffmpeg, paths, config),
            ffprobe: locate_tool(Tool::Ffprobe, paths, config),
            ytdlp: locate_tool(Tool::YtDlp, paths, config),
        };
        for tool in [Tool::Ffmpeg, Tool::Ffprobe, Tool::YtDlp] {
            match tools.get(tool) {
                Some(path) => tracing::info!(tool = tool.name(), path = %path.display(), "tool located"),
                None => tracing::warn!(tool = tool.name(), "tool not found"),
            }
        }
        tools
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg.as_deref(),
            Tool::Ffprobe => self.ffprobe.as_deref(),
            Tool::YtDlp => self.ytdlp.as_deref(),
        }
    }

    pub fn require(&self, tool: Tool) -> Result<&Path> {
        self.get(tool).ok_or_else(|| EngineError::ToolUnavailable {
            tool: tool.name().to_string(),
        })
    }

    /// The ffmpeg path to hand to yt-dlp, only when it names a concrete local file.
    pub fn local_ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg
            .as_deref()
            .filter(|p| p.components().count() > 1 && p.is_file())
    }
}

fn locate_tool(tool: Tool, paths: &AppPaths, config: &EngineConfig) -> Option<PathBuf> {
    candidate_paths(tool, paths, config)
        .into_iter()
        .find(|candidate| is_usable(tool, candidate))
}

fn candidate_paths(tool: Tool, paths: &AppPaths, config: &EngineConfig) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(configured) = tool.configured_path(config) {
        out.push(PathBuf::from(configured));
    }
    out.push(tool.bundled_path(paths));
    for dir in SYSTEM_BIN_DIRS {
        out.push(Path::new(dir).join(tool.file_name()));
    }
    #[cfg(windows)]
    if tool != Tool::YtDlp {
        out.push(Path::new(WINDOWS_FFMPEG_DIR).join(tool.file_name()));
    }
    out.push(PathBuf::from(tool.name()));
    out
}

fn is_usable(tool: Tool, candidate: &Path) -> bool {
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    // Bare names resolve through PATH, so only a successful run proves they exist.
    tool_version_first_line_with_arg(candidate, tool.version_arg()).is_some()
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub tool: Tool,
    pub available: bool,
    pub bundled: bool,
    pub path: Option<String>,
    pub version: Option<String>,
}

pub fn tools_status(paths: &AppPaths, tools: &ToolPaths) -> Vec<ToolStatus> {
    [Tool::Ffmpeg, Tool::Ffprobe, Tool::YtDlp]
        .into_iter()
        .map(|tool| {
            let path = tools.get(tool);
            ToolStatus {
                tool,
                available: path.is_some(),
                bundled: path.is_some_and(|p| p == tool.bundled_path(paths)),
                path: path.map(|p| p.to_string_lossy().to_string()),
                version: path.and_then(|p| tool_version_first_line_with_arg(p, tool.version_arg())),
            }
        })
        .collect()
}

/// Downloads a static ffmpeg/ffprobe build into `tools/ffmpeg`.
pub fn install_ffmpeg_tools(paths: &AppPaths, config: &EngineConfig) -> Result<ToolPaths> {
    paths.ensure_dirs()?;

    let destination = paths.ffmpeg_dir();
    std::fs::create_dir_all(&destination)?;

    let download_url = ffmpeg_sidecar::download::ffmpeg_download_url()
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    tracing::info!(url = %download_url, "downloading ffmpeg");
    let archive_path =
        ffmpeg_sidecar::download::download_ffmpeg_package(download_url, &destination)
            .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    ffmpeg_sidecar::download::unpack_ffmpeg(&archive_path, &destination)
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;

    Ok(ToolPaths::locate(paths, config))
}

fn tool_version_first_line_with_arg(
    program: impl AsRef<std::ffi::OsStr>,
    arg: &str,
) -> Option<String> {
    let output = crate::cmd::command(program).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}
