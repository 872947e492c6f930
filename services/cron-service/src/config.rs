use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use legal_common::env_opt;

use crate::error::ConfigError;
use crate::schedule::When;

const DEFAULT_DATABASE_URL: &str = "host=localhost user=legal dbname=legal";
const DEFAULT_LOCK_EXPIRY_MINUTES: i64 = 30;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_OUTPUT_LIMIT_MB: u64 = 16;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// One entry of the schedule table.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// Whitespace-separated positional arguments.
    pub args: String,
    pub when: When,
    pub lock: Option<String>,
    /// Queue the job instead of skipping it while the lock is held.
    pub blocking: bool,
    /// External program implementing the job.
    pub command: Option<String>,
}

impl JobSpec {
    pub fn builtin(name: &str, when: &str, lock: Option<&str>) -> Result<Self, ConfigError> {
        FileJob {
            name: name.to_string(),
            args: String::new(),
            when: when.to_string(),
            lock: lock.map(str::to_string),
            blocking: false,
            command: None,
        }
        .try_into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileJob {
    name: String,
    #[serde(default)]
    args: String,
    when: String,
    lock: Option<String>,
    #[serde(default)]
    blocking: bool,
    command: Option<String>,
}

impl TryFrom<FileJob> for JobSpec {
    type Error = ConfigError;

    fn try_from(job: FileJob) -> Result<Self, Self::Error> {
        let when = job
            .when
            .parse::<When>()
            .map_err(|err| ConfigError::Schedule {
                job: job.name.clone(),
                when: job.when.clone(),
                reason: err.to_string(),
            })?;
        if job.blocking && job.lock.is_none() {
            return Err(ConfigError::BlockingWithoutLock(job.name));
        }
        Ok(JobSpec {
            name: job.name,
            args: job.args,
            when,
            lock: job.lock,
            blocking: job.blocking,
            command: job.command,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    lock_expiry_minutes: Option<i64>,
    command_timeout_secs: Option<u64>,
    command_output_limit_mb: Option<u64>,
    http_timeout_secs: Option<u64>,
    #[serde(default, rename = "job")]
    jobs: Vec<FileJob>,
}

#[derive(Debug, Clone)]
pub struct CronConfig {
    pub database_url: String,
    pub lock_expiry: chrono::Duration,
    pub command_timeout: Duration,
    pub output_limit_bytes: u64,
    pub http_timeout: Duration,
    pub jobs: Vec<JobSpec>,
}

impl CronConfig {
    /// Jobs every installation runs when the file declares none.
    pub fn default_jobs() -> Result<Vec<JobSpec>, ConfigError> {
        Ok(vec![
            JobSpec::builtin("cnb.cron_update", "20 6,14 *", Some("cnb"))?,
            JobSpec::builtin("cache.cron_purge", "45 3 *", None)?,
        ])
    }
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("CRON_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let repo_path = PathBuf::from("services/cron-service/cron.toml");
    if repo_path.exists() {
        return repo_path;
    }

    PathBuf::from("cron.toml")
}

/// File values override the defaults; environment variables override both.
pub fn load_config() -> Result<CronConfig, ConfigError> {
    load_config_from(&resolve_config_path())
}

pub fn load_config_from(path: &Path) -> Result<CronConfig, ConfigError> {
    let file_config = if path.exists() {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str::<FileConfig>(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?
    } else {
        FileConfig::default()
    };
    build_config(file_config)
}

fn build_config(file_config: FileConfig) -> Result<CronConfig, ConfigError> {
    let database_url = env::var("DATABASE_URL")
        .ok()
        .or(file_config.database_url)
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    let lock_expiry_minutes = env_opt::<i64>("LOCK_EXPIRY_MINUTES")
        .or(file_config.lock_expiry_minutes)
        .unwrap_or(DEFAULT_LOCK_EXPIRY_MINUTES)
        .max(1);
    let command_timeout_secs = env_opt::<u64>("COMMAND_TIMEOUT_SECS")
        .or(file_config.command_timeout_secs)
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
        .max(1);
    let output_limit_mb = env_opt::<u64>("COMMAND_OUTPUT_LIMIT_MB")
        .or(file_config.command_output_limit_mb)
        .unwrap_or(DEFAULT_OUTPUT_LIMIT_MB)
        .max(1);
    let http_timeout_secs = env_opt::<u64>("HTTP_TIMEOUT_SECS")
        .or(file_config.http_timeout_secs)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
        .max(1);

    let jobs = if file_config.jobs.is_empty() {
        CronConfig::default_jobs()?
    } else {
        file_config
            .jobs
            .into_iter()
            .map(JobSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(CronConfig {
        database_url,
        lock_expiry: chrono::Duration::minutes(lock_expiry_minutes),
        command_timeout: Duration::from_secs(command_timeout_secs),
        output_limit_bytes: output_limit_mb * 1024 * 1024,
        http_timeout: Duration::from_secs(http_timeout_secs),
        jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<CronConfig, ConfigError> {
        build_config(toml::from_str::<FileConfig>(text).unwrap())
    }

    #[test]
    fn file_values_and_jobs() {
        let config = parse(
            r#"
            lock_expiry_minutes = 45
            command_timeout_secs = 120

            [[job]]
            name = "psj.cron_update"
            when = "*/2 * *"
            lock = "psj"
            command = "/usr/local/bin/psj-update"

            [[job]]
            name = "common.cron_notify"
            when = "0 */6 *"
            lock = "sir_ws2"
            blocking = true
            "#,
        )
        .unwrap();
        assert_eq!(config.lock_expiry, chrono::Duration::minutes(45));
        assert_eq!(config.command_timeout, Duration::from_secs(120));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].lock.as_deref(), Some("psj"));
        assert!(!config.jobs[0].blocking);
        assert!(config.jobs[1].blocking);
        assert_eq!(config.jobs[1].args, "");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.output_limit_bytes, 16 * 1024 * 1024);
        let names: Vec<_> = config.jobs.iter().map(|job| job.name.as_str()).collect();
        assert_eq!(names, ["cnb.cron_update", "cache.cron_purge"]);
    }

    #[test]
    fn rejects_bad_jobs() {
        let err = parse(
            r#"
            [[job]]
            name = "broken"
            when = "61 * *"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schedule { ref job, .. } if job == "broken"));

        let err = parse(
            r#"
            [[job]]
            name = "orphan"
            when = "* * *"
            blocking = true
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BlockingWithoutLock(ref job) if job == "orphan"));
    }

    #[test]
    fn shipped_config_parses() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/cron.toml"));
        let config = load_config_from(path).unwrap();
        assert_eq!(config.jobs.len(), 15);
        let notify = config
            .jobs
            .iter()
            .find(|job| job.name == "common.cron_notify")
            .unwrap();
        assert!(notify.blocking);
        assert_eq!(notify.when.to_string(), "0 */6 *");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = load_config_from(Path::new("/nonexistent/legal-cron.toml")).unwrap();
        assert!(!config.jobs.is_empty());
    }
}
