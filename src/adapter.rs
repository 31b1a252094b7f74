//! Runs one job as an external ffmpeg or yt-dlp process and reports its
//! lifecycle as [`RunEvent`]s over an mpsc channel.

use crate::cmd;
use crate::config::EngineConfig;
use crate::formats;
use crate::job::{Job, JobId, JobParams};
use crate::joblog;
use crate::paths::AppPaths;
use crate::probe;
use crate::progress::{self, ProgressEstimator, ProgressSignal};
use crate::tools::{Tool, ToolPaths};
use crate::{EngineError, Result};
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Instant;

/// Progress reported as soon as the process is running.
pub const STARTED_PERCENT: u8 = 5;
const STDERR_TAIL_LINES: usize = 20;
const REDACTED: &str = "***";

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started,
    Progress(u8),
    Completed(PathBuf),
    Failed(String),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Completed(_) | RunEvent::Failed(_))
    }
}

/// Something that can execute a job in the background. `submit` returns once
/// the work is handed off; everything after that arrives on `events`, ending
/// with exactly one terminal event. A synchronous `Err` means no event will
/// ever be sent.
pub trait JobExecutor: Send + Sync {
    fn submit(&self, job: &Job, events: Sender<RunEvent>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    File(PathBuf),
    /// yt-dlp picks the extension; the final path is read from its output.
    Folder(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(PathBuf),
    Failed(String),
}

/// One external process run, from command line to outcome.
#[derive(Debug, Clone)]
pub struct ProcessRun {
    pub job_id: JobId,
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: OutputTarget,
    pub started_at: Option<Instant>,
    pub estimator: ProgressEstimator,
    pub outcome: Option<RunOutcome>,
    known_duration: Option<f64>,
}

impl ProcessRun {
    /// Total duration used for progress; 0 when unknown.
    pub fn total_secs(&self) -> f64 {
        self.estimator.total_secs()
    }

    pub fn progress(&self) -> u8 {
        self.estimator.current()
    }

    /// The command line with secrets masked, for logs.
    pub fn display_command(&self) -> String {
        cmd::display_command_line(self.program.as_os_str(), &redact_args(&self.args))
    }

    fn signal(&self, stream: Stream, line: &str) -> ProgressSignal {
        match (self.tool, stream) {
            (Tool::YtDlp, Stream::Stdout) => progress::parse_ytdlp_line(line),
            (Tool::Ffmpeg, Stream::Stderr) => progress::parse_ffmpeg_line(line),
            _ => ProgressSignal::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessAdapter {
    paths: AppPaths,
    tools: ToolPaths,
    config: EngineConfig,
}

impl ProcessAdapter {
    pub fn new(paths: AppPaths, tools: ToolPaths, config: EngineConfig) -> Self {
        Self {
            paths,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Resolves the tool and builds the command line without running anything.
    pub fn plan(&self, job: &Job) -> Result<ProcessRun> {
        let params = job.params();
        let (tool, args, inputs, output, known_duration) = match params {
            JobParams::Download(p) => (
                Tool::YtDlp,
                formats::build_download_args(p, &self.config, self.tools.local_ffmpeg()),
                Vec::new(),
                OutputTarget::Folder(p.output_folder.clone()),
                p.duration_secs,
            ),
            _ => (
                Tool::Ffmpeg,
                build_ffmpeg_args(params, &self.config),
                local_inputs(params),
                OutputTarget::File(params.output_target().to_path_buf()),
                None,
            ),
        };
        let program = self.tools.require(tool)?.to_path_buf();
        Ok(ProcessRun {
            job_id: job.id(),
            tool,
            program,
            args,
            inputs,
            output,
            started_at: None,
            estimator: ProgressEstimator::new(known_duration),
            outcome: None,
            known_duration,
        })
    }

    fn execute(&self, mut run: ProcessRun, params: JobParams, events: &Sender<RunEvent>) {
        let outcome = self.drive(&mut run, &params, events);
        match &outcome {
            RunOutcome::Completed(path) => {
                tracing::info!(job_id = run.job_id, output = %path.display(), "run completed");
                joblog::log_line_best_effort(
                    &self.paths,
                    run.job_id,
                    "info",
                    "run_completed",
                    serde_json::json!({ "output": path.to_string_lossy() }),
                );
                let _ = events.send(RunEvent::Progress(run.estimator.complete()));
                let _ = events.send(RunEvent::Completed(path.clone()));
            }
            RunOutcome::Failed(reason) => {
                tracing::warn!(job_id = run.job_id, reason = %reason, "run failed");
                joblog::log_line_best_effort(
                    &self.paths,
                    run.job_id,
                    "error",
                    "run_failed",
                    serde_json::json!({ "reason": reason }),
                );
                let _ = events.send(RunEvent::Failed(reason.clone()));
            }
        }
        run.outcome = Some(outcome);
    }

    fn drive(&self, run: &mut ProcessRun, params: &JobParams, events: &Sender<RunEvent>) -> RunOutcome {
        if let Some(missing) = run.inputs.iter().find(|p| !p.is_file()) {
            return RunOutcome::Failed(format!("input file not found: {}", missing.display()));
        }

        if run.known_duration.is_none() {
            if let Some(input) = params.primary_input() {
                let total = probe::probe_duration_best_effort(&self.tools, input);
                run.estimator = ProgressEstimator::new(total);
            }
        }

        let output_dir = match &run.output {
            OutputTarget::File(path) => path.parent().map(Path::to_path_buf),
            OutputTarget::Folder(dir) => Some(dir.clone()),
        };
        if let Some(dir) = output_dir.filter(|d| !d.as_os_str().is_empty()) {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                return RunOutcome::Failed(format!(
                    "could not create output folder {}: {err}",
                    dir.display()
                ));
            }
        }

        let command_line = run.display_command();
        tracing::info!(job_id = run.job_id, command = %command_line, "launching");
        joblog::log_line_best_effort(
            &self.paths,
            run.job_id,
            "info",
            "run_started",
            serde_json::json!({
                "tool": run.tool.name(),
                "command": command_line,
                "total_secs": run.total_secs(),
            }),
        );

        let mut child = match cmd::command(&run.program)
            .args(&run.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return RunOutcome::Failed(
                    EngineError::ToolUnavailable {
                        tool: run.tool.name().to_string(),
                    }
                    .to_string(),
                );
            }
            Err(err) => {
                return RunOutcome::Failed(format!("{} could not start: {err}", run.tool.name()));
            }
        };

        run.started_at = Some(Instant::now());
        let _ = events.send(RunEvent::Started);
        let _ = events.send(RunEvent::Progress(
            run.estimator.observe(ProgressSignal::Percent(STARTED_PERCENT as f64)),
        ));

        let (line_tx, line_rx) = mpsc::channel::<(Stream, String)>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            readers.push(thread::spawn(move || read_segments(stdout, Stream::Stdout, tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            readers.push(thread::spawn(move || read_segments(stderr, Stream::Stderr, tx)));
        }
        drop(line_tx);

        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut reported_path: Option<PathBuf> = None;
        for (stream, line) in line_rx {
            let signal = run.signal(stream, &line);
            let before = run.estimator.current();
            let now = run.estimator.observe(signal);
            if now > before {
                tracing::debug!(job_id = run.job_id, percent = now, "progress");
                let _ = events.send(RunEvent::Progress(now));
            }
            if signal != ProgressSignal::Unknown {
                continue;
            }
            match stream {
                Stream::Stderr => {
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line);
                }
                Stream::Stdout if run.tool == Tool::YtDlp => {
                    let candidate = PathBuf::from(line.trim());
                    if candidate.is_absolute() {
                        reported_path = Some(candidate);
                    }
                }
                Stream::Stdout => {}
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                return RunOutcome::Failed(format!("{} failed while running: {err}", run.tool.name()));
            }
        };
        joblog::log_line_best_effort(
            &self.paths,
            run.job_id,
            "info",
            "run_exited",
            serde_json::json!({ "code": status.code(), "success": status.success() }),
        );

        if !status.success() {
            let stderr = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
            return RunOutcome::Failed(
                EngineError::ProcessFailed {
                    tool: run.tool.name().to_string(),
                    code: status.code(),
                    stderr: if stderr.trim().is_empty() {
                        "no error output".to_string()
                    } else {
                        stderr
                    },
                }
                .to_string(),
            );
        }

        match &run.output {
            OutputTarget::File(path) if path.is_file() => RunOutcome::Completed(path.clone()),
            OutputTarget::File(path) => RunOutcome::Failed(format!(
                "{} exited successfully but produced no output at {}",
                run.tool.name(),
                path.display()
            )),
            OutputTarget::Folder(dir) => RunOutcome::Completed(
                reported_path
                    .filter(|p| p.is_file())
                    .unwrap_or_else(|| dir.clone()),
            ),
        }
    }
}

impl JobExecutor for ProcessAdapter {
    fn submit(&self, job: &Job, events: Sender<RunEvent>) -> Result<()> {
        let run = self.plan(job)?;
        let adapter = self.clone();
        let params = job.params().clone();
        thread::Builder::new()
            .name(format!("mediamux-job-{}", job.id()))
            .spawn(move || adapter.execute(run, params, &events))?;
        Ok(())
    }
}

/// ffmpeg arguments for the local job kinds; downloads have none.
pub fn build_ffmpeg_args(params: &JobParams, config: &EngineConfig) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    match params {
        JobParams::Merge(p) => {
            args.extend([
                "-i".to_string(),
                p.video_path.to_string_lossy().to_string(),
                "-i".to_string(),
                p.audio_path.to_string_lossy().to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-c:a".to_string(),
                config.merge_audio_codec.clone(),
                "-map".to_string(),
                "0:v:0".to_string(),
                "-map".to_string(),
                "1:a:0".to_string(),
                // The output ends with whichever input stream ends first.
                "-shortest".to_string(),
                p.output_path.to_string_lossy().to_string(),
            ]);
        }
        JobParams::ExtractAudio(p) => {
            args.extend([
                "-i".to_string(),
                p.video_path.to_string_lossy().to_string(),
                "-vn".to_string(),
                "-c:a".to_string(),
                config.extract_audio_codec.clone(),
                "-b:a".to_string(),
                config.extract_audio_bitrate.clone(),
                p.output_path.to_string_lossy().to_string(),
            ]);
        }
        JobParams::RemoveAudio(p) => {
            args.extend([
                "-i".to_string(),
                p.video_path.to_string_lossy().to_string(),
                "-an".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                p.output_path.to_string_lossy().to_string(),
            ]);
        }
        JobParams::Download(_) => return Vec::new(),
    }
    args
}

fn local_inputs(params: &JobParams) -> Vec<PathBuf> {
    match params {
        JobParams::Merge(p) => vec![p.video_path.clone(), p.audio_path.clone()],
        JobParams::ExtractAudio(p) => vec![p.video_path.clone()],
        JobParams::RemoveAudio(p) => vec![p.video_path.clone()],
        JobParams::Download(_) => Vec::new(),
    }
}

fn redact_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            out.push(REDACTED.to_string());
            hide_next = false;
            continue;
        }
        hide_next = arg == "--video-password";
        out.push(arg.clone());
    }
    out
}

/// Forwards text segments split on `\r` or `\n`, since ffmpeg rewrites its
/// status line with carriage returns.
fn read_segments(mut reader: impl Read, stream: Stream, tx: Sender<(Stream, String)>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0_u8; 4096];
    let flush = |pending: &mut Vec<u8>| -> bool {
        if pending.is_empty() {
            return true;
        }
        let text = String::from_utf8_lossy(pending).trim_end().to_string();
        pending.clear();
        text.is_empty() || tx.send((stream, text)).is_ok()
    };
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        for &byte in &buf[..n] {
            if byte == b'\r' || byte == b'\n' {
                if !flush(&mut pending) {
                    return;
                }
            } else {
                pending.push(byte);
            }
        }
    }
    flush(&mut pending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadParams, MergeParams, RemoveAudioParams};
    use std::time::Duration;

    fn merge_job() -> Job {
        Job::new(
            1,
            JobParams::Merge(MergeParams {
                video_path: PathBuf::from("/media/in.mp4"),
                audio_path: PathBuf::from("/media/voice.wav"),
                output_path: PathBuf::from("/media/out.mp4"),
            }),
        )
    }

    fn adapter_with(dir: &Path, tools: ToolPaths) -> ProcessAdapter {
        ProcessAdapter::new(AppPaths::new(dir.to_path_buf()), tools, EngineConfig::default())
    }

    #[test]
    fn merge_uses_shortest_and_fixed_maps() {
        let args = build_ffmpeg_args(merge_job().params(), &EngineConfig::default());
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-y", "-i", "/media/in.mp4", "-i", "/media/voice.wav",
                "-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0", "-shortest",
                "/media/out.mp4"
            ]
        );
    }

    #[test]
    fn extract_and_remove_audio_args() {
        let extract = JobParams::ExtractAudio(crate::job::ExtractAudioParams {
            video_path: PathBuf::from("in.mp4"),
            output_path: PathBuf::from("out.mp3"),
        });
        let args = build_ffmpeg_args(&extract, &EngineConfig::default());
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
        assert!(args.contains(&"-vn".to_string()));

        let remove = JobParams::RemoveAudio(RemoveAudioParams {
            video_path: PathBuf::from("in.mp4"),
            output_path: PathBuf::from("silent.mp4"),
        });
        let args = build_ffmpeg_args(&remove, &EngineConfig::default());
        assert!(args.contains(&"-an".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert_eq!(args.last().map(String::as_str), Some("silent.mp4"));
    }

    #[test]
    fn missing_tool_fails_synchronously_without_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = adapter_with(dir.path(), ToolPaths::default());
        let (tx, rx) = mpsc::channel();

        let err = adapter.submit(&merge_job(), tx).expect_err("no ffmpeg");
        assert!(matches!(err, EngineError::ToolUnavailable { ref tool } if tool == "ffmpeg"));
        assert_eq!(rx.try_iter().count(), 0);
        assert!(!Path::new("/media/out.mp4").exists());
    }

    #[test]
    fn password_is_masked_in_display_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ytdlp: Some(PathBuf::from("yt-dlp")),
                ..ToolPaths::default()
            },
        );
        let job = Job::new(
            2,
            JobParams::Download(DownloadParams {
                url: "https://vimeo.com/1".to_string(),
                video_format_id: None,
                audio_format_id: None,
                output_folder: PathBuf::from("/downloads"),
                filename: "clip".to_string(),
                audio_only: false,
                password: Some("hunter2".to_string()),
                duration_secs: Some(30.0),
            }),
        );
        let run = adapter.plan(&job).expect("plan");
        assert_eq!(run.tool, Tool::YtDlp);
        assert_eq!(run.total_secs(), 30.0);
        assert!(run.args.contains(&"hunter2".to_string()));
        let shown = run.display_command();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("--video-password ***"));
    }

    #[test]
    fn segments_split_on_carriage_returns() {
        let (tx, rx) = mpsc::channel();
        let data: &[u8] = b"frame=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\nError line\n";
        read_segments(data, Stream::Stderr, tx);
        let lines: Vec<String> = rx.try_iter().map(|(_, l)| l).collect();
        assert_eq!(
            lines,
            vec!["frame=1 time=00:00:01.00", "frame=2 time=00:00:02.00", "Error line"]
        );
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn collect_events(rx: mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(20)) {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[cfg(unix)]
    #[test]
    fn scripted_ffmpeg_reports_elapsed_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = dir.path().join("fake-ffmpeg");
        let ffprobe = dir.path().join("fake-ffprobe");
        write_script(
            &ffmpeg,
            r#"for last; do :; done
printf 'frame=1 time=00:00:01.00 bitrate=1\r' >&2
printf 'frame=2 time=00:00:02.00 bitrate=1\r' >&2
: > "$last""#,
        );
        write_script(
            &ffprobe,
            r#"printf '{"streams":[{"codec_type":"video"}],"format":{"duration":"4.0"}}'"#,
        );

        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"video").expect("input");
        let output = dir.path().join("out").join("silent.mp4");
        let job = Job::new(
            3,
            JobParams::RemoveAudio(RemoveAudioParams {
                video_path: input,
                output_path: output.clone(),
            }),
        );

        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ffmpeg: Some(ffmpeg),
                ffprobe: Some(ffprobe),
                ytdlp: None,
            },
        );
        let (tx, rx) = mpsc::channel();
        adapter.submit(&job, tx).expect("submit");

        assert_eq!(
            collect_events(rx),
            vec![
                RunEvent::Started,
                RunEvent::Progress(5),
                RunEvent::Progress(25),
                RunEvent::Progress(50),
                RunEvent::Progress(100),
                RunEvent::Completed(output.clone()),
            ]
        );
        assert!(output.is_file());
        assert!(AppPaths::new(dir.path().to_path_buf()).job_log_path(3).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn scripted_failure_carries_stderr_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = dir.path().join("fake-ffmpeg");
        write_script(&ffmpeg, "echo 'in.mp4: Invalid data found when processing input' >&2\nexit 1");
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"junk").expect("input");

        let job = Job::new(
            4,
            JobParams::RemoveAudio(RemoveAudioParams {
                video_path: input,
                output_path: dir.path().join("out.mp4"),
            }),
        );
        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ffmpeg: Some(ffmpeg),
                ..ToolPaths::default()
            },
        );
        let (tx, rx) = mpsc::channel();
        adapter.submit(&job, tx).expect("submit");

        let events = collect_events(rx);
        match events.last() {
            Some(RunEvent::Failed(reason)) => {
                assert!(reason.contains("Invalid data found"), "reason: {reason}");
                assert!(reason.contains("code=Some(1)"), "reason: {reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn success_without_output_file_is_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = dir.path().join("fake-ffmpeg");
        write_script(&ffmpeg, "exit 0");
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"video").expect("input");

        let job = Job::new(
            5,
            JobParams::RemoveAudio(RemoveAudioParams {
                video_path: input,
                output_path: dir.path().join("never.mp4"),
            }),
        );
        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ffmpeg: Some(ffmpeg),
                ..ToolPaths::default()
            },
        );
        let (tx, rx) = mpsc::channel();
        adapter.submit(&job, tx).expect("submit");
        assert!(matches!(
            collect_events(rx).last(),
            Some(RunEvent::Failed(reason)) if reason.contains("produced no output")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn scripted_download_reports_percent_and_final_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("downloads");
        let final_path = folder.join("clip.mp4");
        let ytdlp = dir.path().join("fake-yt-dlp");
        write_script(
            &ytdlp,
            &format!(
                "echo '[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:05'\n\
                 echo '[download]  97.6% of 10.00MiB at 1.00MiB/s ETA 00:00'\n\
                 : > '{path}'\n\
                 echo '{path}'",
                path = final_path.display()
            ),
        );

        let job = Job::new(
            6,
            JobParams::Download(DownloadParams {
                url: "https://example.com/v".to_string(),
                video_format_id: Some("137".to_string()),
                audio_format_id: Some("140".to_string()),
                output_folder: folder,
                filename: "clip".to_string(),
                audio_only: false,
                password: None,
                duration_secs: None,
            }),
        );
        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ytdlp: Some(ytdlp),
                ..ToolPaths::default()
            },
        );
        let (tx, rx) = mpsc::channel();
        adapter.submit(&job, tx).expect("submit");

        assert_eq!(
            collect_events(rx),
            vec![
                RunEvent::Started,
                RunEvent::Progress(5),
                RunEvent::Progress(42),
                RunEvent::Progress(98),
                RunEvent::Progress(100),
                RunEvent::Completed(final_path),
            ]
        );
    }

    #[test]
    fn missing_input_fails_before_spawning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = adapter_with(
            dir.path(),
            ToolPaths {
                ffmpeg: Some(PathBuf::from("/nonexistent/ffmpeg")),
                ..ToolPaths::default()
            },
        );
        let job = Job::new(
            7,
            JobParams::RemoveAudio(RemoveAudioParams {
                video_path: dir.path().join("missing.mp4"),
                output_path: dir.path().join("out.mp4"),
            }),
        );
        let (tx, rx) = mpsc::channel();
        adapter.submit(&job, tx).expect("submit");
        assert!(matches!(
            collect_events(rx).as_slice(),
            [RunEvent::Failed(reason)] if reason.contains("input file not found")
        ));
    }
}
