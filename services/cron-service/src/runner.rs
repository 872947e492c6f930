//! One scheduler tick: purge stale locks, drain deferred jobs, then run
//! every schedule entry that is due.

use chrono::{DateTime, Local, Utc};

use legal_store::{Claim, CronStore, StoreError};

use crate::config::JobSpec;
use crate::error::JobError;
use crate::jobs::{JobContext, JobRegistry};
use crate::models::{CronStatus, TickReport};

pub struct Scheduler {
    ctx: JobContext,
    registry: JobRegistry,
    schedule: Vec<JobSpec>,
    lock_expiry: chrono::Duration,
}

impl Scheduler {
    pub fn new(
        ctx: JobContext,
        registry: JobRegistry,
        schedule: Vec<JobSpec>,
        lock_expiry: chrono::Duration,
    ) -> Self {
        Self {
            ctx,
            registry,
            schedule,
            lock_expiry,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn schedule(&self) -> &[JobSpec] {
        &self.schedule
    }

    /// Job failures are recorded in the report; store failures abort the tick.
    pub async fn cron_run(&self, now: DateTime<Local>) -> Result<TickReport, StoreError> {
        let store = self.ctx.store.as_ref();
        let stamp = now.with_timezone(&Utc);
        let mut report = TickReport {
            locks_purged: store.purge_locks(stamp - self.lock_expiry).await?,
            ..TickReport::default()
        };
        if report.locks_purged > 0 {
            tracing::warn!(locks = report.locks_purged, "expired locks purged");
        }

        for pending in store.pending().await? {
            match store.claim_pending(pending.id, stamp).await? {
                Claim::Claimed { job, acquired } => {
                    self.run_job(&job.name, &job.args, &mut report).await;
                    release(store, &job.lock, acquired).await?;
                    tracing::debug!(
                        job = job.name.as_str(),
                        args = job.args.as_str(),
                        "scheduled job completed"
                    );
                }
                Claim::LockHeld => {
                    tracing::debug!(
                        job = pending.name.as_str(),
                        lock = pending.lock.as_str(),
                        "pending job still locked"
                    );
                }
                Claim::Gone => {
                    tracing::debug!(id = pending.id, "pending job claimed elsewhere");
                }
            }
        }

        let local = now.naive_local();
        for spec in self.schedule.iter().filter(|spec| spec.when.matches(&local)) {
            let Some(lock) = spec.lock.as_deref() else {
                self.run_job(&spec.name, &spec.args, &mut report).await;
                continue;
            };

            if let Some(acquired) = store.try_lock(lock, stamp).await? {
                self.run_job(&spec.name, &spec.args, &mut report).await;
                release(store, lock, acquired).await?;
            } else if spec.blocking {
                store.enqueue(&spec.name, &spec.args, lock, stamp).await?;
                report.deferred.push(spec.name.clone());
                tracing::debug!(
                    job = spec.name.as_str(),
                    args = spec.args.as_str(),
                    lock,
                    "job scheduled"
                );
            } else {
                report.skipped.push(spec.name.clone());
                tracing::debug!(job = spec.name.as_str(), lock, "job skipped, lock held");
            }
        }

        tracing::info!(
            ran = report.ran.len(),
            skipped = report.skipped.len(),
            deferred = report.deferred.len(),
            failed = report.failed.len(),
            "tick finished"
        );
        Ok(report)
    }

    async fn run_job(&self, name: &str, args: &str, report: &mut TickReport) {
        match self.registry.run(&self.ctx, name, args).await {
            Ok(()) => {
                tracing::debug!(job = name, args, "job completed");
                report.ran.push(name.to_string());
            }
            Err(err) => {
                tracing::error!(job = name, args, error = %err, "job failed");
                report.failed.push(name.to_string());
            }
        }
    }

    /// Runs one job immediately, bypassing schedule and locks.
    pub async fn call(&self, name: &str, args: &str) -> Result<(), JobError> {
        self.registry.run(&self.ctx, name, args).await
    }

    pub async fn cron_unlock(&self) -> Result<u64, StoreError> {
        cron_unlock(self.ctx.store.as_ref()).await
    }

    pub async fn cron_clean(&self) -> Result<(), StoreError> {
        cron_clean(self.ctx.store.as_ref()).await
    }

    pub async fn cron_status(&self) -> Result<CronStatus, StoreError> {
        cron_status(self.ctx.store.as_ref()).await
    }
}

/// A job that outlived the lock expiry no longer owns its lock.
async fn release(
    store: &dyn CronStore,
    lock: &str,
    acquired: DateTime<Utc>,
) -> Result<(), StoreError> {
    if !store.unlock(lock, acquired).await? {
        tracing::warn!(lock, "lock expired while the job ran");
    }
    Ok(())
}

pub async fn cron_unlock(store: &dyn CronStore) -> Result<u64, StoreError> {
    let removed = store.unlock_all().await?;
    tracing::info!(locks = removed, "locks removed");
    Ok(removed)
}

pub async fn cron_clean(store: &dyn CronStore) -> Result<(), StoreError> {
    let removed = store.clear_pending().await?;
    tracing::info!(pending = removed, "pending jobs deleted");
    cron_unlock(store).await?;
    Ok(())
}

pub async fn cron_status(store: &dyn CronStore) -> Result<CronStatus, StoreError> {
    Ok(CronStatus {
        locks: store.locks().await?,
        pending: store.pending().await?,
    })
}
