use thiserror::Error;

use legal_calc::RateTableError;
use legal_store::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("invalid arguments for {job}: {reason}")]
    InvalidArgs { job: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("server communication error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    RateTable(#[from] RateTableError),

    #[error("command {program} failed: {reason}")]
    Command { program: String, reason: String },

    #[error("command {program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("job {job}: invalid schedule {when:?}: {reason}")]
    Schedule {
        job: String,
        when: String,
        reason: String,
    },

    #[error("job {0}: blocking requires a lock")]
    BlockingWithoutLock(String),
}

/// Anything that stops the `legal-cron` command itself.
#[derive(Debug, Error)]
pub enum CronError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("encode output: {0}")]
    Output(#[from] serde_json::Error),
}
