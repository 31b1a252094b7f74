pub mod adapter;
pub mod cmd;
pub mod config;
pub mod db;
pub mod engine;
mod error;
pub mod formats;
pub mod history;
pub mod job;
pub mod joblog;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod tools;

pub use engine::Engine;
pub use error::{EngineError, Result};
pub use job::{Job, JobId, JobKind, JobParams, JobState};
pub use scheduler::Scheduler;
