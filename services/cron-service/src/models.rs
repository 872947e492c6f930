use serde::Serialize;

use legal_store::{Lock, Pending};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub locks_purged: u64,
    pub ran: Vec<String>,
    pub skipped: Vec<String>,
    pub deferred: Vec<String>,
    pub failed: Vec<String>,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CronStatus {
    pub locks: Vec<Lock>,
    pub pending: Vec<Pending>,
}
