use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lock {
    pub name: String,
    pub timestamp_add: DateTime<Utc>,
}

/// A job deferred because its lock was held when it came due.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pending {
    pub id: i64,
    pub name: String,
    pub args: String,
    pub lock: String,
    pub timestamp_add: DateTime<Utc>,
}

/// Result of trying to take over a pending job.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The row is gone and its lock now carries the `acquired` stamp.
    Claimed {
        job: Pending,
        acquired: DateTime<Utc>,
    },
    /// The job's lock is still held; the row stays queued.
    LockHeld,
    /// Another tick removed or is removing the row.
    Gone,
}
