//! Job handlers and the registry the scheduler dispatches through.
//!
//! Jobs are addressed as `module.method`. Built-in jobs cover scheduler
//! maintenance, the page cache and the CNB rates; site scrapers are external
//! programs wrapped in [`CommandJob`].

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio::{io::AsyncReadExt, process::Command, time::sleep};

use legal_calc::{parse_cnb_history, RateKind};
use legal_store::{CronStore, PageCache, RateStore};

use crate::cache::fetch_cached;
use crate::config::JobSpec;
use crate::error::JobError;
use crate::runner::{cron_clean, cron_unlock};

/// How long a downloaded CNB history is reused.
fn cnb_refresh() -> chrono::Duration {
    chrono::Duration::hours(1)
}

pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub output_limit_bytes: u64,
}

/// Everything a job may touch while it runs.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn CronStore>,
    pub cache: Arc<dyn PageCache>,
    pub rates: Arc<dyn RateStore>,
    pub http: reqwest::Client,
    pub limits: CommandLimits,
}

pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn describe(&self) -> String {
        self.name().to_string()
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, args: &'a [String]) -> JobFuture<'a>;
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Arc<dyn Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UnlockJob));
        registry.register(Arc::new(CleanJob));
        registry.register(Arc::new(CachePurgeJob));
        registry.register(Arc::new(CnbUpdateJob));
        registry
    }

    pub fn register(&mut self, job: Arc<dyn Job>) {
        self.jobs.insert(job.name().to_string(), job);
    }

    /// Registers a [`CommandJob`] for every schedule entry naming a program.
    pub fn register_commands(&mut self, specs: &[JobSpec]) {
        for spec in specs {
            if let Some(program) = &spec.command {
                self.register(Arc::new(CommandJob::new(&spec.name, program)));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).cloned()
    }

    pub fn describe(&self) -> Vec<String> {
        self.jobs.values().map(|job| job.describe()).collect()
    }

    /// Runs `name` with whitespace-separated `args`.
    pub async fn run(&self, ctx: &JobContext, name: &str, args: &str) -> Result<(), JobError> {
        let job = self
            .get(name)
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))?;
        let args: Vec<String> = args.split_whitespace().map(str::to_string).collect();
        job.run(ctx, &args).await
    }
}

pub struct UnlockJob;

impl Job for UnlockJob {
    fn name(&self) -> &str {
        "common.cron_unlock"
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, _args: &'a [String]) -> JobFuture<'a> {
        Box::pin(async move {
            cron_unlock(ctx.store.as_ref()).await?;
            Ok(())
        })
    }
}

pub struct CleanJob;

impl Job for CleanJob {
    fn name(&self) -> &str {
        "common.cron_clean"
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, _args: &'a [String]) -> JobFuture<'a> {
        Box::pin(async move {
            cron_clean(ctx.store.as_ref()).await?;
            Ok(())
        })
    }
}

pub struct CachePurgeJob;

impl Job for CachePurgeJob {
    fn name(&self) -> &str {
        "cache.cron_purge"
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, _args: &'a [String]) -> JobFuture<'a> {
        Box::pin(async move {
            let purged = ctx.cache.purge_expired(Utc::now()).await?;
            tracing::info!(purged, "expired cache entries deleted");
            Ok(())
        })
    }
}

/// Refreshes the CNB rate histories, all kinds unless some are named.
pub struct CnbUpdateJob;

impl Job for CnbUpdateJob {
    fn name(&self) -> &str {
        "cnb.cron_update"
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, args: &'a [String]) -> JobFuture<'a> {
        Box::pin(async move {
            let kinds = if args.is_empty() {
                RateKind::ALL.to_vec()
            } else {
                args.iter()
                    .map(|arg| {
                        arg.parse::<RateKind>().map_err(|err| JobError::InvalidArgs {
                            job: self.name().to_string(),
                            reason: err.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };

            for kind in kinds {
                let url = kind.history_url();
                let text = fetch_cached(
                    ctx.cache.as_ref(),
                    &ctx.http,
                    &url,
                    Some(cnb_refresh()),
                    Utc::now(),
                )
                .await?;
                let rates = parse_cnb_history(kind, &text)?;
                let written = ctx.rates.upsert_rates(&rates).await?;
                tracing::info!(kind = %kind, rates = written, "mpi rates updated");
            }
            Ok(())
        })
    }
}

/// A job implemented by an external program; the job's arguments become
/// the program's arguments.
pub struct CommandJob {
    name: String,
    program: String,
}

impl CommandJob {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
        }
    }
}

impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.program)
    }

    fn run<'a>(&'a self, ctx: &'a JobContext, args: &'a [String]) -> JobFuture<'a> {
        Box::pin(async move {
            let output = run_command(&self.program, args, &ctx.limits).await?;
            tracing::debug!(
                job = self.name.as_str(),
                duration_ms = output.duration_ms,
                stdout = output.stdout.as_str(),
                "command finished"
            );
            if !output.stderr.is_empty() {
                tracing::warn!(
                    job = self.name.as_str(),
                    stderr = output.stderr.as_str(),
                    "command wrote to stderr"
                );
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Runs `program` to completion. A non-zero exit, oversized output or the
/// timeout fail the run; on timeout the process is killed.
pub async fn run_command(
    program: &str,
    args: &[String],
    limits: &CommandLimits,
) -> Result<CommandOutput, JobError> {
    let failed = |reason: String| JobError::Command {
        program: program.to_string(),
        reason,
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started_at = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|err| failed(format!("spawn: {err}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| failed("stdout unavailable".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| failed("stderr unavailable".to_string()))?;

    let stdout_handle = tokio::spawn(read_limited(stdout, limits.output_limit_bytes));
    let stderr_handle = tokio::spawn(read_limited(stderr, limits.output_limit_bytes));

    let status = tokio::select! {
        result = child.wait() => result.map_err(|err| failed(format!("wait: {err}")))?,
        _ = sleep(limits.timeout) => {
            let _ = child.kill().await;
            stdout_handle.abort();
            stderr_handle.abort();
            return Err(JobError::Timeout {
                program: program.to_string(),
                secs: limits.timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle
        .await
        .map_err(|_| failed("stdout join error".to_string()))?
        .map_err(&failed)?;
    let stderr = stderr_handle
        .await
        .map_err(|_| failed("stderr join error".to_string()))?
        .map_err(&failed)?;
    let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

    if !status.success() {
        return Err(failed(format!("exit: {status}, stderr: {stderr}")));
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        duration_ms: started_at.elapsed().as_millis() as u64,
    })
}

async fn read_limited<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    limit_bytes: u64,
) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .map_err(|err| format!("read: {err}"))?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() as u64 > limit_bytes {
            return Err("output limit exceeded".to_string());
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_store::MemoryStore;
    use chrono::NaiveDate;
    use legal_calc::RateSource;

    fn context(store: Arc<MemoryStore>) -> JobContext {
        JobContext {
            store: store.clone(),
            cache: store.clone(),
            rates: store,
            http: reqwest::Client::new(),
            limits: CommandLimits {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 1024,
            },
        }
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let ctx = context(Arc::new(MemoryStore::new()));
        let err = JobRegistry::with_builtins()
            .run(&ctx, "nope.cron_nothing", "")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJob(ref name) if name == "nope.cron_nothing"));
    }

    #[tokio::test]
    async fn cnb_update_reads_cached_histories() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let histories = [
            (RateKind::Disc, "PLATNA_OD|CNB_DISKONTNI_SAZBA_V_%\n20121102|0,05\n"),
            (RateKind::Lomb, "PLATNA_OD|CNB_LOMBARDNI_SAZBA_V_%\n20121102|0,25\n"),
            (RateKind::Repo, "PLATNA_OD|CNB_REPO_SAZBA_V_%\n20121102|0,05\n20170804|0,25\n"),
        ];
        for (kind, text) in histories {
            store
                .store_page(&kind.history_url(), text, Some(now + cnb_refresh()), now)
                .await
                .unwrap();
        }

        let ctx = context(store.clone());
        JobRegistry::with_builtins()
            .run(&ctx, "cnb.cron_update", "")
            .await
            .unwrap();

        let table = store.load_rates().await.unwrap();
        assert_eq!(table.len(), 4);
        let day = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        assert_eq!(table.rate(RateKind::Repo, day), Some(0.25));
        assert_eq!(table.rate(RateKind::Lomb, day), Some(0.25));
    }

    #[tokio::test]
    async fn cnb_update_rejects_unknown_kind() {
        let ctx = context(Arc::new(MemoryStore::new()));
        let err = JobRegistry::with_builtins()
            .run(&ctx, "cnb.cron_update", "EURIBOR")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn builtin_unlock_clears_locks() {
        let store = Arc::new(MemoryStore::new());
        store.try_lock("psj", Utc::now()).await.unwrap();
        let ctx = context(store.clone());
        JobRegistry::with_builtins()
            .run(&ctx, "common.cron_unlock", "")
            .await
            .unwrap();
        assert!(store.locks().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_job_passes_arguments() {
        let limits = CommandLimits {
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1024,
        };
        let output = run_command("echo", &["3".to_string(), "4".to_string()], &limits)
            .await
            .unwrap();
        assert_eq!(output.stdout, "3 4");
        assert_eq!(output.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failures() {
        let limits = CommandLimits {
            timeout: Duration::from_millis(200),
            output_limit_bytes: 1024,
        };
        let err = run_command("false", &[], &limits).await.unwrap_err();
        assert!(matches!(err, JobError::Command { .. }));
        let err = run_command("sleep", &["5".to_string()], &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout { .. }));
        let err = run_command("/nonexistent/legal-job", &[], &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Command { ref reason, .. } if reason.starts_with("spawn")));
    }

    #[test]
    fn schedule_commands_are_registered() {
        let spec = JobSpec {
            name: "psj.cron_update".to_string(),
            args: String::new(),
            when: crate::schedule::When::always(),
            lock: Some("psj".to_string()),
            blocking: false,
            command: Some("/usr/local/lib/legal/psj-update".to_string()),
        };
        let mut registry = JobRegistry::with_builtins();
        registry.register_commands(&[spec]);
        assert!(registry.get("psj.cron_update").is_some());
        assert!(registry
            .describe()
            .contains(&"psj.cron_update (/usr/local/lib/legal/psj-update)".to_string()));
    }
}
