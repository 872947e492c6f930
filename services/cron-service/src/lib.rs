//! Periodic job runner with database-backed mutual exclusion.
//!
//! The OS cron invokes `legal-cron run` every minute. Each invocation is one
//! tick of [`runner::Scheduler::cron_run`]: jobs sharing a lock never overlap,
//! and a blocking job whose lock is busy is queued for a later tick.

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod runner;
pub mod schedule;

pub use config::{load_config, load_config_from, CronConfig, JobSpec};
pub use error::{ConfigError, CronError, JobError};
pub use jobs::{CommandLimits, Job, JobContext, JobRegistry};
pub use models::{CronStatus, TickReport};
pub use runner::Scheduler;
pub use legal_store::{CronStore, MemoryStore, PageCache, PgStore, RateStore, StoreError};
