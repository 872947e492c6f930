use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;

use legal_calc::RateTable;
use legal_store::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub rates: Arc<RwLock<RateTable>>,
    /// Absent when no database is configured; statutory interest then fails
    /// with a missing rate.
    pub store: Option<PgStore>,
    pub rates_refresh: Duration,
}

#[cfg(test)]
impl AppState {
    /// State without a database, preloaded with `rates`.
    pub fn offline(rates: RateTable) -> Self {
        Self {
            rates: Arc::new(RwLock::new(rates)),
            store: None,
            rates_refresh: Duration::from_secs(3600),
        }
    }
}
