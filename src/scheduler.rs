//! Single-flight FIFO job queue.
//!
//! All queue state lives behind one mutex. Each submitted job gets one
//! consumer thread that drains its [`RunEvent`] channel back into the queue.
//! Collaborator callbacks are batched while the lock is held and delivered in
//! order by a dispatcher thread, so no callback ever runs under the lock and
//! events of different jobs never interleave.

use crate::adapter::{JobExecutor, RunEvent};
use crate::job::{Job, JobId, JobKind, JobParams, JobState};
use crate::sink::{Collaborators, Severity};
use crate::store::JobStore;
use crate::{EngineError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

const EXECUTOR_VANISHED: &str = "executor stopped without reporting an outcome";

enum Notice {
    Progress {
        job_id: JobId,
        percent: u8,
    },
    State {
        job_id: JobId,
        state: JobState,
        error: Option<String>,
    },
    Notify {
        title: String,
        message: String,
        severity: Severity,
    },
    History {
        output: PathBuf,
        kind: JobKind,
    },
}

struct QueueState {
    jobs: BTreeMap<JobId, Job>,
    next_id: JobId,
    active: Option<JobId>,
    running: bool,
    /// Notice batches queued for the dispatcher but not yet delivered.
    undelivered: usize,
    store: Option<JobStore>,
    notices: Sender<Vec<Notice>>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.active.is_none() && self.undelivered == 0
    }

    fn publish(&mut self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        self.undelivered += 1;
        if self.notices.send(notices).is_err() {
            self.undelivered -= 1;
        }
    }

    fn persist(&self, job_id: JobId) {
        let (Some(store), Some(job)) = (&self.store, self.jobs.get(&job_id)) else {
            return;
        };
        if let Err(err) = store.update(job) {
            tracing::warn!(job_id, error = %err, "persisting job state failed");
        }
    }

    fn next_pending(&self) -> Option<JobId> {
        self.jobs
            .values()
            .find(|job| job.state() == JobState::Pending)
            .map(Job::id)
    }
}

struct Shared {
    state: Mutex<QueueState>,
    changed: Condvar,
    executor: Arc<dyn JobExecutor>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts the oldest Pending job unless one is already active. Jobs whose
    /// submission fails synchronously are marked Failed and skipped.
    fn advance(self: &Arc<Self>, state: &mut QueueState) -> Option<JobId> {
        if state.active.is_some() {
            return None;
        }
        loop {
            let job_id = state.next_pending()?;
            let snapshot = {
                let job = state.jobs.get_mut(&job_id)?;
                if let Err(err) = job.begin_processing() {
                    tracing::warn!(job_id, error = %err, "pending job could not enter processing");
                    return None;
                }
                job.clone()
            };
            state.active = Some(job_id);
            state.persist(job_id);

            let mut notices = vec![Notice::State {
                job_id,
                state: JobState::Processing,
                error: None,
            }];

            let (tx, rx) = mpsc::channel();
            match self.executor.submit(&snapshot, tx) {
                Ok(()) => {
                    tracing::info!(job_id, kind = %snapshot.kind(), "job started");
                    state.publish(notices);
                    let shared = Arc::clone(self);
                    thread::spawn(move || shared.consume(job_id, rx));
                    return Some(job_id);
                }
                Err(err) => {
                    let reason = err.to_string();
                    tracing::warn!(job_id, error = %reason, "job could not be started");
                    if let Some(job) = state.jobs.get_mut(&job_id) {
                        let _ = job.fail(reason.as_str());
                    }
                    state.active = None;
                    state.persist(job_id);
                    notices.push(Notice::State {
                        job_id,
                        state: JobState::Failed,
                        error: Some(reason.clone()),
                    });
                    notices.push(failure_notice(job_id, snapshot.kind(), &reason));
                    state.publish(notices);
                }
            }
        }
    }

    fn consume(self: Arc<Self>, job_id: JobId, events: Receiver<RunEvent>) {
        for event in events {
            let terminal = event.is_terminal();
            self.apply(job_id, event);
            if terminal {
                return;
            }
        }
        self.apply(job_id, RunEvent::Failed(EXECUTOR_VANISHED.to_string()));
    }

    fn apply(self: &Arc<Self>, job_id: JobId, event: RunEvent) {
        let mut state = self.lock();
        if state.active != Some(job_id) {
            tracing::debug!(job_id, "ignoring event for a job that is not active");
            return;
        }

        let mut notices = Vec::new();
        match event {
            RunEvent::Started => tracing::debug!(job_id, "process running"),
            RunEvent::Progress(percent) => {
                let changed = state
                    .jobs
                    .get_mut(&job_id)
                    .is_some_and(|job| job.record_progress(percent));
                if changed {
                    if let Some(store) = &state.store {
                        if let Err(err) = store.update_progress(job_id, percent) {
                            tracing::warn!(job_id, error = %err, "persisting progress failed");
                        }
                    }
                    notices.push(Notice::Progress { job_id, percent });
                }
            }
            RunEvent::Completed(output) => {
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    return;
                };
                let before = job.progress();
                if let Err(err) = job.complete(output.clone()) {
                    tracing::warn!(job_id, error = %err, "completion ignored");
                    return;
                }
                let kind = job.kind();
                state.active = None;
                state.persist(job_id);
                tracing::info!(job_id, output = %output.display(), "job completed");

                if before < 100 {
                    notices.push(Notice::Progress {
                        job_id,
                        percent: 100,
                    });
                }
                notices.push(Notice::State {
                    job_id,
                    state: JobState::Completed,
                    error: None,
                });
                notices.push(Notice::Notify {
                    title: kind.done_label().to_string(),
                    message: output.display().to_string(),
                    severity: Severity::Success,
                });
                notices.push(Notice::History { output, kind });
            }
            RunEvent::Failed(reason) => {
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    return;
                };
                if let Err(err) = job.fail(reason.as_str()) {
                    tracing::warn!(job_id, error = %err, "failure ignored");
                    return;
                }
                let kind = job.kind();
                state.active = None;
                state.persist(job_id);
                tracing::warn!(job_id, reason = %reason, "job failed");

                notices.push(Notice::State {
                    job_id,
                    state: JobState::Failed,
                    error: Some(reason.clone()),
                });
                notices.push(failure_notice(job_id, kind, &reason));
            }
        }

        state.publish(notices);
        if state.active.is_none() && state.running {
            self.advance(&mut state);
        }
        drop(state);
        self.changed.notify_all();
    }
}

fn failure_notice(job_id: JobId, kind: JobKind, reason: &str) -> Notice {
    Notice::Notify {
        title: "Job failed".to_string(),
        message: format!("{kind} job {job_id}: {reason}"),
        severity: Severity::Error,
    }
}

fn dispatch_loop(batches: Receiver<Vec<Notice>>, shared: Weak<Shared>, collaborators: Collaborators) {
    for batch in batches {
        for notice in batch {
            match notice {
                Notice::Progress { job_id, percent } => collaborators.ui.progress(job_id, percent),
                Notice::State {
                    job_id,
                    state,
                    error,
                } => collaborators
                    .ui
                    .state_changed(job_id, state, error.as_deref()),
                Notice::Notify {
                    title,
                    message,
                    severity,
                } => collaborators.notifier.notify(&title, &message, severity),
                Notice::History { output, kind } => collaborators.history.record(&output, kind),
            }
        }
        if let Some(shared) = shared.upgrade() {
            let mut state = shared.lock();
            state.undelivered = state.undelivered.saturating_sub(1);
            drop(state);
            shared.changed.notify_all();
        }
    }
}

/// Handle to the job queue. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// An in-memory queue.
    pub fn new(executor: Arc<dyn JobExecutor>, collaborators: Collaborators) -> Self {
        Self::build(executor, collaborators, None, Vec::new(), 1)
    }

    /// A queue persisted in `store`. Jobs left Processing by a previous run
    /// are reloaded as Failed; ids continue after the highest id the store
    /// has ever handed out.
    pub fn with_store(
        store: JobStore,
        executor: Arc<dyn JobExecutor>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let interrupted = store.mark_interrupted()?;
        if interrupted > 0 {
            tracing::warn!(count = interrupted, "jobs interrupted by shutdown marked failed");
        }
        let jobs = store.load_all()?;
        let next_id = store.next_job_id()?;
        tracing::info!(count = jobs.len(), next_id, "job queue restored");
        Ok(Self::build(executor, collaborators, Some(store), jobs, next_id))
    }

    fn build(
        executor: Arc<dyn JobExecutor>,
        collaborators: Collaborators,
        store: Option<JobStore>,
        jobs: Vec<Job>,
        next_id: JobId,
    ) -> Self {
        let next_id = jobs
            .iter()
            .map(Job::id)
            .max()
            .map_or(next_id, |max| next_id.max(max + 1));
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: jobs.into_iter().map(|job| (job.id(), job)).collect(),
                next_id,
                active: None,
                running: false,
                undelivered: 0,
                store,
                notices: tx,
            }),
            changed: Condvar::new(),
            executor,
        });
        let weak = Arc::downgrade(&shared);
        thread::spawn(move || dispatch_loop(rx, weak, collaborators));
        Self { shared }
    }

    /// Validates and appends a Pending job. Never starts execution.
    pub fn enqueue(&self, params: JobParams) -> Result<JobId> {
        params.validate()?;
        let mut state = self.shared.lock();
        let job_id = state.next_id;
        let job = Job::new(job_id, params);
        if let Some(store) = &state.store {
            store.insert(&job)?;
        }
        let kind = job.kind();
        state.next_id += 1;
        state.jobs.insert(job_id, job);
        state.publish(vec![Notice::State {
            job_id,
            state: JobState::Pending,
            error: None,
        }]);
        tracing::info!(job_id, kind = %kind, "job enqueued");
        Ok(job_id)
    }

    /// Enters running mode and starts the oldest Pending job if nothing is
    /// active. Returns the id of the job it started, if any.
    pub fn start(&self) -> Option<JobId> {
        let mut state = self.shared.lock();
        if !state.running {
            tracing::info!("queue running");
        }
        state.running = true;
        let started = self.shared.advance(&mut state);
        drop(state);
        self.shared.changed.notify_all();
        started
    }

    /// Stops pulling new jobs. The active job runs to completion.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if state.running {
            tracing::info!("queue paused");
        }
        state.running = false;
    }

    pub fn remove(&self, job_id: JobId) -> Result<()> {
        let mut state = self.shared.lock();
        let job = state
            .jobs
            .get(&job_id)
            .ok_or(EngineError::UnknownJob(job_id))?;
        if job.state() != JobState::Pending {
            return Err(EngineError::InvalidState {
                job_id,
                state: job.state(),
            });
        }
        if let Some(store) = &state.store {
            store.delete(job_id)?;
        }
        state.jobs.remove(&job_id);
        tracing::info!(job_id, "job removed");
        Ok(())
    }

    /// Removes every job except the active one. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let active = state.active;
        let ids: Vec<JobId> = state
            .jobs
            .keys()
            .copied()
            .filter(|id| Some(*id) != active)
            .collect();
        if let Some(store) = state.store.as_mut() {
            store.delete_many(&ids)?;
        }
        for id in &ids {
            state.jobs.remove(id);
        }
        tracing::info!(count = ids.len(), "queue cleared");
        Ok(ids.len())
    }

    /// Enqueues a fresh job with the params of a Failed one.
    pub fn retry(&self, job_id: JobId) -> Result<JobId> {
        let params = {
            let state = self.shared.lock();
            let job = state
                .jobs
                .get(&job_id)
                .ok_or(EngineError::UnknownJob(job_id))?;
            if job.state() != JobState::Failed {
                return Err(EngineError::InvalidState {
                    job_id,
                    state: job.state(),
                });
            }
            job.params().clone()
        };
        self.enqueue(params)
    }

    /// Snapshot of every job in id order.
    pub fn jobs(&self) -> Vec<Job> {
        self.shared.lock().jobs.values().cloned().collect()
    }

    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.shared.lock().jobs.get(&job_id).cloned()
    }

    pub fn active_job(&self) -> Option<Job> {
        let state = self.shared.lock();
        state.active.and_then(|id| state.jobs.get(&id).cloned())
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Blocks until no job is active and every notification has been
    /// delivered. Returns false on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| !s.is_idle())
            .unwrap_or_else(|e| e.into_inner());
        state.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExtractAudioParams, MergeParams};
    use crate::paths::AppPaths;
    use crate::sink::{EngineEvent, EventChannel, LogNotifier, MemoryHistory};
    use std::collections::HashSet;
    use std::time::Instant;

    /// Holds each job's event sender so the test decides when runs progress.
    #[derive(Default)]
    struct ManualExecutor {
        submitted: Mutex<Vec<(JobId, Sender<RunEvent>)>>,
        refuse: Mutex<HashSet<JobId>>,
    }

    impl ManualExecutor {
        fn send(&self, job_id: JobId, event: RunEvent) {
            let submitted = self.submitted.lock().expect("lock");
            let (_, tx) = submitted
                .iter()
                .find(|(id, _)| *id == job_id)
                .expect("job was submitted");
            tx.send(event).expect("consumer alive");
        }

        fn order(&self) -> Vec<JobId> {
            self.submitted
                .lock()
                .expect("lock")
                .iter()
                .map(|(id, _)| *id)
                .collect()
        }
    }

    impl JobExecutor for ManualExecutor {
        fn submit(&self, job: &Job, events: Sender<RunEvent>) -> Result<()> {
            if self.refuse.lock().expect("lock").contains(&job.id()) {
                return Err(EngineError::ToolUnavailable {
                    tool: "ffmpeg".to_string(),
                });
            }
            self.submitted.lock().expect("lock").push((job.id(), events));
            Ok(())
        }
    }

    struct DroppingExecutor;

    impl JobExecutor for DroppingExecutor {
        fn submit(&self, _job: &Job, _events: Sender<RunEvent>) -> Result<()> {
            Ok(())
        }
    }

    fn extract(n: u32) -> JobParams {
        JobParams::ExtractAudio(ExtractAudioParams {
            video_path: PathBuf::from(format!("/media/{n}.mp4")),
            output_path: PathBuf::from(format!("/media/{n}.mp3")),
        })
    }

    fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn state_of(scheduler: &Scheduler, id: JobId) -> JobState {
        scheduler.job(id).expect("job exists").state()
    }

    fn processing_count(scheduler: &Scheduler) -> usize {
        scheduler
            .jobs()
            .iter()
            .filter(|j| j.state() == JobState::Processing)
            .count()
    }

    fn manual_scheduler() -> (Arc<ManualExecutor>, Scheduler) {
        let executor = Arc::new(ManualExecutor::default());
        let scheduler = Scheduler::new(executor.clone(), Collaborators::default());
        (executor, scheduler)
    }

    #[test]
    fn jobs_start_in_fifo_order_one_at_a_time() {
        let (executor, scheduler) = manual_scheduler();
        let ids: Vec<JobId> = (1..=3)
            .map(|n| scheduler.enqueue(extract(n)).expect("enqueue"))
            .collect();
        assert!(scheduler.jobs().iter().all(|j| j.state() == JobState::Pending));

        assert_eq!(scheduler.start(), Some(ids[0]));
        assert_eq!(scheduler.start(), None);
        for (i, id) in ids.iter().enumerate() {
            wait_for("job to start", || state_of(&scheduler, *id) == JobState::Processing);
            assert_eq!(processing_count(&scheduler), 1);
            executor.send(*id, RunEvent::Completed(PathBuf::from(format!("/media/{}.mp3", i + 1))));
            wait_for("job to finish", || state_of(&scheduler, *id) == JobState::Completed);
            assert!(processing_count(&scheduler) <= 1);
        }
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(executor.order(), ids);
    }

    #[test]
    fn progress_is_monotone_and_completion_is_100() {
        let executor = Arc::new(ManualExecutor::default());
        let (tx, rx) = mpsc::channel();
        let history = Arc::new(MemoryHistory::default());
        let scheduler = Scheduler::new(
            executor.clone(),
            Collaborators::new(Arc::new(EventChannel::new(tx)), Arc::new(LogNotifier), history.clone()),
        );
        let id = scheduler.enqueue(extract(1)).expect("enqueue");
        scheduler.start();

        executor.send(id, RunEvent::Started);
        executor.send(id, RunEvent::Progress(30));
        executor.send(id, RunEvent::Progress(20));
        executor.send(id, RunEvent::Progress(60));
        executor.send(id, RunEvent::Completed(PathBuf::from("/media/1.mp3")));
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));

        let job = scheduler.job(id).expect("job");
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.progress(), 100);

        let events: Vec<EngineEvent> = rx.try_iter().collect();
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![30, 60, 100]);
        let states: Vec<JobState> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![JobState::Pending, JobState::Processing, JobState::Completed]
        );
        assert_eq!(
            history.entries(),
            vec![(PathBuf::from("/media/1.mp3"), JobKind::ExtractAudio)]
        );
    }

    #[test]
    fn remove_only_pending_jobs() {
        let (executor, scheduler) = manual_scheduler();
        let first = scheduler.enqueue(extract(1)).expect("enqueue");
        let second = scheduler.enqueue(extract(2)).expect("enqueue");
        let third = scheduler.enqueue(extract(3)).expect("enqueue");
        scheduler.start();

        let err = scheduler.remove(first).expect_err("processing");
        assert!(matches!(
            err,
            EngineError::InvalidState { job_id, state: JobState::Processing } if job_id == first
        ));
        assert_eq!(state_of(&scheduler, first), JobState::Processing);

        scheduler.remove(second).expect("remove pending");
        assert!(scheduler.job(second).is_none());
        assert!(matches!(scheduler.remove(second), Err(EngineError::UnknownJob(_))));

        executor.send(first, RunEvent::Completed(PathBuf::from("/media/1.mp3")));
        wait_for("third to start", || state_of(&scheduler, third) == JobState::Processing);
        assert!(matches!(
            scheduler.remove(first),
            Err(EngineError::InvalidState { state: JobState::Completed, .. })
        ));
        assert_eq!(executor.order(), vec![first, third]);
    }

    #[test]
    fn pause_lets_active_job_finish_without_advancing() {
        let (executor, scheduler) = manual_scheduler();
        let first = scheduler.enqueue(extract(1)).expect("enqueue");
        let second = scheduler.enqueue(extract(2)).expect("enqueue");
        scheduler.start();
        scheduler.pause();
        assert!(!scheduler.is_running());

        executor.send(first, RunEvent::Completed(PathBuf::from("/media/1.mp3")));
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(state_of(&scheduler, first), JobState::Completed);
        assert_eq!(state_of(&scheduler, second), JobState::Pending);

        assert_eq!(scheduler.start(), Some(second));
    }

    #[test]
    fn failures_are_recorded_and_queue_proceeds() {
        let (executor, scheduler) = manual_scheduler();
        let first = scheduler.enqueue(extract(1)).expect("enqueue");
        let second = scheduler.enqueue(extract(2)).expect("enqueue");
        let third = scheduler.enqueue(extract(3)).expect("enqueue");
        executor.refuse.lock().expect("lock").insert(second);

        scheduler.start();
        executor.send(first, RunEvent::Failed("ffmpeg exited with code 1".to_string()));
        wait_for("third to start", || state_of(&scheduler, third) == JobState::Processing);

        let failed = scheduler.job(first).expect("first");
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.error(), Some("ffmpeg exited with code 1"));
        let refused = scheduler.job(second).expect("second");
        assert_eq!(refused.state(), JobState::Failed);
        assert!(refused.error().is_some_and(|e| e.contains("ffmpeg")));
        assert_eq!(executor.order(), vec![first, third]);
    }

    #[test]
    fn invalid_params_create_no_job() {
        let (_executor, scheduler) = manual_scheduler();
        let err = scheduler
            .enqueue(JobParams::Merge(MergeParams {
                video_path: PathBuf::from("/media/a.mp4"),
                audio_path: PathBuf::new(),
                output_path: PathBuf::from("/media/out.mp4"),
            }))
            .expect_err("invalid");
        assert!(matches!(err, EngineError::InvalidParams(_)));
        assert!(scheduler.jobs().is_empty());
        assert_eq!(scheduler.enqueue(extract(1)).expect("enqueue"), 1);
    }

    #[test]
    fn clear_keeps_active_job() {
        let (executor, scheduler) = manual_scheduler();
        let first = scheduler.enqueue(extract(1)).expect("enqueue");
        scheduler.enqueue(extract(2)).expect("enqueue");
        scheduler.enqueue(extract(3)).expect("enqueue");
        scheduler.start();

        assert_eq!(scheduler.clear().expect("clear"), 2);
        let remaining: Vec<JobId> = scheduler.jobs().iter().map(Job::id).collect();
        assert_eq!(remaining, vec![first]);

        executor.send(first, RunEvent::Completed(PathBuf::from("/media/1.mp3")));
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(scheduler.clear().expect("clear"), 1);
        assert!(scheduler.jobs().is_empty());
    }

    #[test]
    fn retry_enqueues_a_new_job() {
        let (executor, scheduler) = manual_scheduler();
        let first = scheduler.enqueue(extract(1)).expect("enqueue");
        assert!(matches!(
            scheduler.retry(first),
            Err(EngineError::InvalidState { state: JobState::Pending, .. })
        ));

        scheduler.start();
        scheduler.pause();
        executor.send(first, RunEvent::Failed("boom".to_string()));
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));

        let retried = scheduler.retry(first).expect("retry");
        assert_ne!(retried, first);
        assert_eq!(state_of(&scheduler, first), JobState::Failed);
        let job = scheduler.job(retried).expect("retried job");
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.params(), &extract(1));
        assert!(matches!(scheduler.retry(99), Err(EngineError::UnknownJob(99))));
    }

    #[test]
    fn executor_hanging_up_fails_the_job() {
        let scheduler = Scheduler::new(Arc::new(DroppingExecutor), Collaborators::default());
        let id = scheduler.enqueue(extract(1)).expect("enqueue");
        scheduler.start();
        assert!(scheduler.wait_until_idle(Duration::from_secs(5)));
        let job = scheduler.job(id).expect("job");
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error(), Some(EXECUTOR_VANISHED));
    }

    #[test]
    fn stored_queue_recovers_after_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());

        let (first, second) = {
            let executor = Arc::new(ManualExecutor::default());
            let scheduler = Scheduler::with_store(
                JobStore::open(&paths).expect("store"),
                executor,
                Collaborators::default(),
            )
            .expect("scheduler");
            let first = scheduler.enqueue(extract(1)).expect("enqueue");
            let second = scheduler.enqueue(extract(2)).expect("enqueue");
            scheduler.start();
            assert_eq!(state_of(&scheduler, first), JobState::Processing);
            (first, second)
        };

        let scheduler = Scheduler::with_store(
            JobStore::open(&paths).expect("reopen"),
            Arc::new(ManualExecutor::default()),
            Collaborators::default(),
        )
        .expect("restored");
        let interrupted = scheduler.job(first).expect("first");
        assert_eq!(interrupted.state(), JobState::Failed);
        assert_eq!(interrupted.error(), Some(crate::store::INTERRUPTED_ERROR));
        assert_eq!(state_of(&scheduler, second), JobState::Pending);

        let third = scheduler.enqueue(extract(3)).expect("enqueue");
        assert!(third > second);
    }

    fn stored_scheduler(paths: &AppPaths) -> Scheduler {
        Scheduler::with_store(
            JobStore::open(paths).expect("store"),
            Arc::new(ManualExecutor::default()),
            Collaborators::default(),
        )
        .expect("scheduler")
    }

    #[test]
    fn ids_are_not_reused_after_clear_and_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());

        let last = {
            let scheduler = stored_scheduler(&paths);
            scheduler.enqueue(extract(1)).expect("enqueue");
            let last = scheduler.enqueue(extract(2)).expect("enqueue");
            assert_eq!(scheduler.clear().expect("clear"), 2);
            last
        };

        let scheduler = stored_scheduler(&paths);
        assert!(scheduler.jobs().is_empty());
        let next = scheduler.enqueue(extract(3)).expect("enqueue after restart");
        assert!(next > last, "id {next} reused");
    }

    #[test]
    fn unreadable_newest_row_does_not_block_enqueue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        {
            let scheduler = stored_scheduler(&paths);
            assert_eq!(scheduler.enqueue(extract(1)).expect("enqueue"), 1);
        }
        crate::db::open_migrated(&paths)
            .expect("db")
            .execute(
                "INSERT INTO job (id, kind, state, progress, params_json, created_at_ms)
                 VALUES (2, 'merge', 'pending', 0, '{not json', 0)",
                [],
            )
            .expect("raw insert");

        let scheduler = stored_scheduler(&paths);
        assert_eq!(scheduler.jobs().len(), 1);
        let first = scheduler.enqueue(extract(3)).expect("enqueue");
        let second = scheduler.enqueue(extract(4)).expect("enqueue");
        assert_eq!((first, second), (3, 4));
    }
}
