//! Converts the progress text printed by ffmpeg and yt-dlp into a single
//! monotone percentage.

use regex::Regex;
use std::sync::OnceLock;

/// Ceiling for percentages inferred from elapsed time. Only confirmed
/// completion reports 100.
pub const ELAPSED_ESTIMATE_CAP: f64 = 95.0;

/// Ceiling for percentages a tool reports itself. yt-dlp prints 100% once
/// per downloaded stream, before muxing and moving the file.
pub const REPORTED_PERCENT_CAP: f64 = 99.0;

/// A raw progress observation, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressSignal {
    /// The process stated its own percentage.
    Percent(f64),
    /// Media time processed so far, in seconds.
    Elapsed(f64),
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total_secs: f64,
    last: u8,
}

impl ProgressEstimator {
    pub fn new(total_secs: Option<f64>) -> Self {
        let total_secs = total_secs
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(0.0);
        Self { total_secs, last: 0 }
    }

    /// Total duration used for elapsed-time estimates; 0 when unknown.
    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    pub fn current(&self) -> u8 {
        self.last
    }

    /// Folds one signal in and returns the value to report. The result never
    /// drops below a previously returned value.
    pub fn observe(&mut self, signal: ProgressSignal) -> u8 {
        let candidate = match signal {
            ProgressSignal::Percent(pct) if pct.is_finite() => pct.min(REPORTED_PERCENT_CAP),
            ProgressSignal::Elapsed(secs) if secs.is_finite() && self.total_secs > 0.0 => {
                (secs / self.total_secs * 100.0).min(ELAPSED_ESTIMATE_CAP)
            }
            _ => 0.0,
        };
        let rounded = candidate.round().clamp(0.0, 100.0) as u8;
        if rounded > self.last {
            self.last = rounded;
        }
        self.last
    }

    pub fn complete(&mut self) -> u8 {
        self.last = 100;
        self.last
    }
}

/// Parses `HH:MM:SS[.ms]` into seconds.
pub fn parse_timemark(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if hours < 0.0 || !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn ffmpeg_time_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").ok())
        .as_ref()
}

fn ytdlp_percent_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:\[download\]|download:)\s*(\d{1,3}(?:\.\d+)?)%").ok())
        .as_ref()
}

/// Reads an ffmpeg status line such as
/// `frame=  240 fps=0.0 size=1024kB time=00:00:10.00 bitrate=838.9kbits/s`.
pub fn parse_ffmpeg_line(line: &str) -> ProgressSignal {
    ffmpeg_time_re()
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_timemark(m.as_str()))
        .map(ProgressSignal::Elapsed)
        .unwrap_or(ProgressSignal::Unknown)
}

/// Reads a yt-dlp progress line (`[download]  42.3% of ...` or the
/// `download:42.3%` progress template).
pub fn parse_ytdlp_line(line: &str) -> ProgressSignal {
    ytdlp_percent_re()
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(ProgressSignal::Percent)
        .unwrap_or(ProgressSignal::Unknown)
}
