//! Boundaries to the host application: UI updates, user notifications and
//! the recent-files history.

use crate::job::{JobId, JobKind, JobState};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

pub trait HistorySink: Send + Sync {
    fn record(&self, output: &Path, kind: JobKind);
}

/// Receives every normalized progress update and every state transition.
pub trait UiChannel: Send + Sync {
    fn progress(&self, job_id: JobId, percent: u8);
    fn state_changed(&self, job_id: JobId, state: JobState, error: Option<&str>);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Progress {
        job_id: JobId,
        percent: u8,
    },
    StateChanged {
        job_id: JobId,
        state: JobState,
        error: Option<String>,
    },
}

/// `UiChannel` over an mpsc sender, for hosts that poll events from their own thread.
pub struct EventChannel {
    tx: Mutex<Sender<EngineEvent>>,
}

impl EventChannel {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    fn send(&self, event: EngineEvent) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        // A dropped receiver means nobody is listening any more.
        let _ = tx.send(event);
    }
}

impl UiChannel for EventChannel {
    fn progress(&self, job_id: JobId, percent: u8) {
        self.send(EngineEvent::Progress { job_id, percent });
    }

    fn state_changed(&self, job_id: JobId, state: JobState, error: Option<&str>) {
        self.send(EngineEvent::StateChanged {
            job_id,
            state,
            error: error.map(str::to_string),
        });
    }
}

/// Notifications written to the tracing log instead of a desktop popup.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!(title, message, "notification"),
            Severity::Info | Severity::Success => tracing::info!(title, message, "notification"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUi;

impl UiChannel for NoopUi {
    fn progress(&self, _job_id: JobId, _percent: u8) {}
    fn state_changed(&self, _job_id: JobId, _state: JobState, _error: Option<&str>) {}
}

/// History kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<(PathBuf, JobKind)>>,
}

impl MemoryHistory {
    pub fn entries(&self) -> Vec<(PathBuf, JobKind)> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, output: &Path, kind: JobKind) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((output.to_path_buf(), kind));
    }
}

/// The three collaborators a scheduler reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub ui: Arc<dyn UiChannel>,
    pub notifier: Arc<dyn NotificationSink>,
    pub history: Arc<dyn HistorySink>,
}

impl Collaborators {
    pub fn new(
        ui: Arc<dyn UiChannel>,
        notifier: Arc<dyn NotificationSink>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            ui,
            notifier,
            history,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            ui: Arc::new(NoopUi),
            notifier: Arc::new(LogNotifier),
            history: Arc::new(MemoryHistory::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn event_channel_forwards_in_order() {
        let (tx, rx) = mpsc::channel();
        let channel = EventChannel::new(tx);
        channel.state_changed(3, JobState::Processing, None);
        channel.progress(3, 40);
        channel.state_changed(3, JobState::Failed, Some("boom"));

        let events: Vec<EngineEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                EngineEvent::StateChanged {
                    job_id: 3,
                    state: JobState::Processing,
                    error: None
                },
                EngineEvent::Progress {
                    job_id: 3,
                    percent: 40
                },
                EngineEvent::StateChanged {
                    job_id: 3,
                    state: JobState::Failed,
                    error: Some("boom".to_string())
                },
            ]
        );
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        EventChannel::new(tx).progress(1, 10);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&EngineEvent::Progress {
            job_id: 2,
            percent: 55,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"type":"progress","job_id":2,"percent":55}"#);
    }
}
