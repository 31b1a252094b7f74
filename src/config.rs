use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Engine settings persisted at `config/engine.json`.
///
/// Every field has a default so partially written files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit ffmpeg binary; checked before the bundled copy and system locations.
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub ytdlp_path: Option<String>,
    /// Audio codec used when muxing a separate audio file onto a video.
    pub merge_audio_codec: String,
    pub extract_audio_codec: String,
    pub extract_audio_bitrate: String,
    /// Target format for yt-dlp `--audio-format` when extracting audio.
    pub download_audio_format: String,
    /// yt-dlp `--audio-quality`; "0" is best.
    pub download_audio_quality: String,
    pub download_merge_format: String,
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            ytdlp_path: None,
            merge_audio_codec: "aac".to_string(),
            extract_audio_codec: "libmp3lame".to_string(),
            extract_audio_bitrate: "192k".to_string(),
            download_audio_format: "mp3".to_string(),
            download_audio_quality: "0".to_string(),
            download_merge_format: "mp4".to_string(),
            history_limit: 10,
        }
    }
}

pub fn load_config(paths: &AppPaths) -> Result<EngineConfig> {
    let path = paths.engine_config_path();
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: EngineConfig =
        serde_json::from_slice(&bytes).map_err(|e| EngineError::InvalidConfig {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    Ok(parsed)
}

pub fn save_config(paths: &AppPaths, config: &EngineConfig) -> Result<()> {
    let path = paths.engine_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let config = load_config(&paths).expect("load");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.merge_audio_codec, "aac");
        assert_eq!(config.extract_audio_bitrate, "192k");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        std::fs::create_dir_all(paths.config_dir()).expect("config dir");
        std::fs::write(
            paths.engine_config_path(),
            r#"{ "ffmpeg_path": "/opt/ffmpeg/bin/ffmpeg", "history_limit": 25 }"#,
        )
        .expect("write");

        let config = load_config(&paths).expect("load");
        assert_eq!(config.ffmpeg_path.as_deref(), Some("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.download_audio_format, "mp3");
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        std::fs::create_dir_all(paths.config_dir()).expect("config dir");
        std::fs::write(paths.engine_config_path(), "{ not json").expect("write");

        let err = load_config(&paths).expect_err("should fail");
        assert!(matches!(err, EngineError::InvalidConfig { .. }));
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let config = EngineConfig {
            ytdlp_path: Some("/usr/local/bin/yt-dlp".to_string()),
            extract_audio_bitrate: "256k".to_string(),
            ..EngineConfig::default()
        };
        save_config(&paths, &config).expect("save");
        assert_eq!(load_config(&paths).expect("load"), config);
    }
}
