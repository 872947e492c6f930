//! Postgres persistence shared by the scheduler and the calculator service:
//! job locks and the pending queue, the page cache and CNB rate tables.

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::PgStore;
pub use error::StoreError;
pub use models::{Claim, Lock, Pending};
pub use store::{CronStore, MemoryStore, PageCache, RateStore};
