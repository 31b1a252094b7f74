use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use mediamux_engine::job::{DownloadParams, ExtractAudioParams, MergeParams, RemoveAudioParams};
use mediamux_engine::paths::AppPaths;
use mediamux_engine::sink::{EngineEvent, EventChannel, LogNotifier, NoopUi};
use mediamux_engine::{logging, tools, Engine, EngineError, JobId, JobParams, JobState};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    logging::init(None);

    let mut base_dir: Option<PathBuf> = None;
    let mut rest: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--base-dir requires a value".to_string())?;
                base_dir = Some(PathBuf::from(v));
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    let base_dir = base_dir
        .or_else(default_base_dir)
        .ok_or_else(|| "could not determine base dir; pass --base-dir".to_string())?;
    let paths = AppPaths::new(base_dir);

    let (command, rest) = rest
        .split_first()
        .ok_or_else(|| "missing command (try --help)".to_string())?;

    match command.as_str() {
        "merge" => {
            let [video, audio, output] = positional::<3>(command, rest)?;
            run_job(
                &paths,
                JobParams::Merge(MergeParams {
                    video_path: video.into(),
                    audio_path: audio.into(),
                    output_path: output.into(),
                }),
            )
        }
        "extract-audio" => {
            let [video, output] = positional::<2>(command, rest)?;
            run_job(
                &paths,
                JobParams::ExtractAudio(ExtractAudioParams {
                    video_path: video.into(),
                    output_path: output.into(),
                }),
            )
        }
        "remove-audio" => {
            let [video, output] = positional::<2>(command, rest)?;
            run_job(
                &paths,
                JobParams::RemoveAudio(RemoveAudioParams {
                    video_path: video.into(),
                    output_path: output.into(),
                }),
            )
        }
        "download" => {
            let params = parse_download(&paths, rest)?;
            run_job(&paths, JobParams::Download(params))
        }
        "info" => {
            let (url, password) = parse_info(rest)?;
            let engine = open_quiet(&paths)?;
            match engine.fetch_media_info(&url, password.as_deref()) {
                Ok(info) => {
                    let json = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
                    println!("{json}");
                    Ok(())
                }
                Err(err @ EngineError::PasswordRequired { .. }) => Err(format!(
                    "{err}; rerun with --password <password>"
                )),
                Err(err) => Err(err.to_string()),
            }
        }
        "probe" => {
            let [path] = positional::<1>(command, rest)?;
            let engine = open_quiet(&paths)?;
            let probe = engine.probe(&PathBuf::from(path)).map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&probe).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }
        "tools" => {
            if rest.iter().any(|a| a == "--install-ffmpeg") {
                let config =
                    mediamux_engine::config::load_config(&paths).map_err(|e| e.to_string())?;
                println!("FFmpeg: installing into {}...", paths.ffmpeg_dir().display());
                tools::install_ffmpeg_tools(&paths, &config).map_err(|e| e.to_string())?;
            }
            let engine = open_quiet(&paths)?;
            for status in engine.tools_status() {
                println!(
                    "{:<8} {:<4} {}{}",
                    status.tool.name(),
                    if status.available { "ok" } else { "--" },
                    status.path.as_deref().unwrap_or("not found"),
                    status
                        .version
                        .as_deref()
                        .map(|v| format!("  ({v})"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        "history" => {
            let engine = open_quiet(&paths)?;
            if rest.iter().any(|a| a == "--clear") {
                let removed = engine.history().clear().map_err(|e| e.to_string())?;
                println!("cleared {removed} entries");
                return Ok(());
            }
            for file in engine.history().list().map_err(|e| e.to_string())? {
                println!("{:<14} {}", file.kind.as_str(), file.path.display());
            }
            Ok(())
        }
        "jobs" => {
            let engine = open_quiet(&paths)?;
            for job in engine.scheduler().jobs() {
                println!(
                    "{:>4} {:<14} {:<10} {:>3}% {}",
                    job.id(),
                    job.kind().as_str(),
                    job.state().as_str(),
                    job.progress(),
                    job.error().unwrap_or("")
                );
            }
            Ok(())
        }
        other => Err(format!("unknown command: {other} (try --help)")),
    }
}

fn open_quiet(paths: &AppPaths) -> Result<Engine, String> {
    Engine::open(paths.clone(), Arc::new(NoopUi), Arc::new(LogNotifier)).map_err(|e| e.to_string())
}

/// Enqueues one job, runs the queue until it is idle and prints every event.
fn run_job(paths: &AppPaths, params: JobParams) -> Result<(), String> {
    let (tx, rx) = mpsc::channel();
    let engine = Engine::open(
        paths.clone(),
        Arc::new(EventChannel::new(tx)),
        Arc::new(LogNotifier),
    )
    .map_err(|e| e.to_string())?;

    let scheduler = engine.scheduler();
    let job_id = scheduler.enqueue(params).map_err(|e| e.to_string())?;
    println!("job {job_id} queued");
    scheduler.start();

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => print_event(&event),
            Err(RecvTimeoutError::Timeout) => {
                if scheduler.wait_until_idle(Duration::ZERO) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for event in rx.try_iter() {
        print_event(&event);
    }

    finish(engine.scheduler().job(job_id), job_id)
}

fn finish(job: Option<mediamux_engine::Job>, job_id: JobId) -> Result<(), String> {
    let job = job.ok_or_else(|| format!("job {job_id} disappeared"))?;
    match job.state() {
        JobState::Completed => {
            if let Some(output) = job.output_location() {
                println!("{}", output.display());
            }
            Ok(())
        }
        JobState::Failed => Err(job.error().unwrap_or("job failed").to_string()),
        other => Err(format!("job {job_id} stopped while {other}")),
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Progress { job_id, percent } => println!("job {job_id}: {percent}%"),
        EngineEvent::StateChanged {
            job_id,
            state,
            error: Some(error),
        } => println!("job {job_id}: {state} ({error})"),
        EngineEvent::StateChanged { job_id, state, .. } => println!("job {job_id}: {state}"),
    }
}

fn positional<const N: usize>(command: &str, rest: &[String]) -> Result<[String; N], String> {
    <[String; N]>::try_from(rest.to_vec())
        .map_err(|_| format!("{command} expects {N} argument(s) (try --help)"))
}

fn parse_download(paths: &AppPaths, rest: &[String]) -> Result<DownloadParams, String> {
    let mut url: Option<String> = None;
    let mut params = DownloadParams {
        url: String::new(),
        video_format_id: None,
        audio_format_id: None,
        output_folder: paths.default_download_dir(),
        filename: String::new(),
        audio_only: false,
        password: None,
        duration_secs: None,
    };

    let mut i = 0;
    while i < rest.len() {
        let flag = rest[i].as_str();
        match flag {
            "--video" => params.video_format_id = Some(flag_value(rest, &mut i, flag)?),
            "--audio" => params.audio_format_id = Some(flag_value(rest, &mut i, flag)?),
            "--out" => params.output_folder = PathBuf::from(flag_value(rest, &mut i, flag)?),
            "--name" => params.filename = flag_value(rest, &mut i, flag)?,
            "--password" => params.password = Some(flag_value(rest, &mut i, flag)?),
            "--audio-only" => params.audio_only = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown download flag: {other}"))
            }
            other if url.is_none() => url = Some(other.to_string()),
            other => return Err(format!("unexpected argument: {other}")),
        }
        i += 1;
    }

    params.url = url.ok_or_else(|| "download requires a url".to_string())?;
    if params.filename.trim().is_empty() {
        params.filename = "%(title)s".to_string();
    }
    Ok(params)
}

fn parse_info(rest: &[String]) -> Result<(String, Option<String>), String> {
    let mut url: Option<String> = None;
    let mut password: Option<String> = None;
    let mut i = 0;
    while i < rest.len() {
        let flag = rest[i].as_str();
        match flag {
            "--password" => password = Some(flag_value(rest, &mut i, flag)?),
            other if url.is_none() => url = Some(other.to_string()),
            other => return Err(format!("unexpected argument: {other}")),
        }
        i += 1;
    }
    Ok((url.ok_or_else(|| "info requires a url".to_string())?, password))
}

fn flag_value(rest: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    rest.get(*i)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("MEDIAMUX_BASE_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }

    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let t = appdata.trim();
            if !t.is_empty() {
                return Some(PathBuf::from(t).join("mediamux"));
            }
        }
    }

    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        let t = data_home.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t).join("mediamux"));
        }
    }
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .map(|h| PathBuf::from(h).join(".local").join("share").join("mediamux"))
}

fn print_help() {
    println!(
        r#"mediamux

Queues media jobs (merge, extract/remove audio, download) and runs them with
ffmpeg and yt-dlp.

Usage:
  mediamux [--base-dir <path>] <command> [args]

Commands:
  merge <video> <audio> <output>     Mux audio onto video (ends with the shorter stream)
  extract-audio <video> <output>     Write the audio track as MP3
  remove-audio <video> <output>      Copy the video without audio
  download <url> [--video <id>] [--audio <id>] [--audio-only]
           [--out <dir>] [--name <file stem>] [--password <pw>]
  info <url> [--password <pw>]       Print available formats as JSON
  probe <path>                       Print ffprobe details as JSON
  tools [--install-ffmpeg]           Show (or install) external tools
  history [--clear]                  Show recent outputs
  jobs                               List persisted jobs

Environment:
  MEDIAMUX_BASE_DIR   Base dir for config, database, logs and bundled tools
  MEDIAMUX_LOG        Log filter (falls back to RUST_LOG)
"#
    );
}
