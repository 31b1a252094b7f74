use crate::adapter::ProcessAdapter;
use crate::config::{self, EngineConfig};
use crate::db::{self, BaseDirLock};
use crate::formats::{self, RemoteMediaInfo};
use crate::history::RecentFiles;
use crate::joblog::{self, JobLogRetentionPolicy};
use crate::paths::AppPaths;
use crate::probe::{self, MediaProbe};
use crate::scheduler::Scheduler;
use crate::sink::{Collaborators, NotificationSink, UiChannel};
use crate::store::JobStore;
use crate::tools::{self, ToolPaths, ToolStatus};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Everything a host needs, wired over one base directory: config, located
/// tools, the persisted queue driving real processes, and recent files.
///
/// Only one engine may own a base dir at a time; a second `open` fails with
/// `BaseDirInUse` until the first engine is dropped.
pub struct Engine {
    paths: AppPaths,
    config: EngineConfig,
    tools: ToolPaths,
    scheduler: Scheduler,
    history: Arc<RecentFiles>,
    _lock: BaseDirLock,
}

impl Engine {
    pub fn open(
        paths: AppPaths,
        ui: Arc<dyn UiChannel>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        paths.ensure_dirs()?;
        let lock = db::lock_base_dir(&paths)?;
        let config = config::load_config(&paths)?;
        let tools = ToolPaths::locate(&paths, &config);

        let prune_paths = paths.clone();
        thread::spawn(move || {
            match joblog::prune_job_logs(&prune_paths, &JobLogRetentionPolicy::default()) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "pruned job logs"),
                Err(err) => tracing::warn!(error = %err, "job log pruning failed"),
            }
        });

        let history = Arc::new(RecentFiles::open(&paths, config.history_limit)?);
        let adapter = Arc::new(ProcessAdapter::new(
            paths.clone(),
            tools.clone(),
            config.clone(),
        ));
        let scheduler = Scheduler::with_store(
            JobStore::open(&paths)?,
            adapter,
            Collaborators::new(ui, notifier, history.clone()),
        )?;

        Ok(Self {
            paths,
            config,
            tools,
            scheduler,
            history,
            _lock: lock,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &RecentFiles {
        &self.history
    }

    pub fn tools_status(&self) -> Vec<ToolStatus> {
        tools::tools_status(&self.paths, &self.tools)
    }

    pub fn probe(&self, path: &Path) -> Result<MediaProbe> {
        probe::probe(&self.tools, path)
    }

    pub fn fetch_media_info(&self, url: &str, password: Option<&str>) -> Result<RemoteMediaInfo> {
        formats::fetch_media_info(&self.tools, url, password)
    }
}
