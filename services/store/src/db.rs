use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

use legal_calc::{MpiRate, RateKind, RateTable};

use crate::error::StoreError;
use crate::models::{Claim, Lock, Pending};
use crate::store::{CronStore, PageCache, RateStore};

const SQL_PURGE_LOCKS: &str = "DELETE FROM cron_lock WHERE timestamp_add < $1";
const SQL_TRY_LOCK: &str = "INSERT INTO cron_lock (name, timestamp_add) VALUES ($1, $2) \
ON CONFLICT (name) DO NOTHING RETURNING timestamp_add";
const SQL_UNLOCK: &str = "DELETE FROM cron_lock WHERE name = $1 AND timestamp_add = $2";
const SQL_UNLOCK_ALL: &str = "DELETE FROM cron_lock";
const SQL_LIST_LOCKS: &str = "SELECT name, timestamp_add FROM cron_lock ORDER BY name";

const SQL_INSERT_PENDING: &str = "INSERT INTO cron_pending (name, args, lock, timestamp_add) \
VALUES ($1, $2, $3, $4) RETURNING id";
const SQL_LIST_PENDING: &str =
    "SELECT id, name, args, lock, timestamp_add FROM cron_pending ORDER BY timestamp_add, id";
const SQL_SELECT_PENDING_FOR_CLAIM: &str = "SELECT id, name, args, lock, timestamp_add \
FROM cron_pending WHERE id = $1 FOR UPDATE SKIP LOCKED";
const SQL_DELETE_PENDING: &str = "DELETE FROM cron_pending WHERE id = $1";
const SQL_CLEAR_PENDING: &str = "DELETE FROM cron_pending";

const SQL_PURGE_CACHE: &str = "DELETE FROM cache WHERE expire IS NOT NULL AND expire < $1";
const SQL_SELECT_CACHE: &str = "SELECT text FROM cache WHERE url = $1";
const SQL_UPSERT_CACHE: &str = "INSERT INTO cache (url, text, expire, timestamp_add) \
VALUES ($1, $2, $3, $4) \
ON CONFLICT (url) DO UPDATE SET text = EXCLUDED.text, expire = EXCLUDED.expire, \
timestamp_add = EXCLUDED.timestamp_add";

const SQL_UPSERT_RATE: &str = "INSERT INTO mpi_rate (kind, valid, rate) VALUES ($1, $2, $3) \
ON CONFLICT (kind, valid) DO UPDATE SET rate = EXCLUDED.rate";
const SQL_LIST_RATES: &str = "SELECT kind, valid, rate FROM mpi_rate ORDER BY kind, valid";

/// Postgres-backed store shared by the scheduler, the page cache and the
/// rate tables.
#[derive(Clone)]
pub struct PgStore {
    db: Arc<Mutex<Client>>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let (db, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        tokio::spawn(async move {
            // Drive the connection in the background.
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "database connection error");
            }
        });
        Ok(Self::new(db))
    }

    pub fn new(db: Client) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.lock().await.simple_query("SELECT 1").await?;
        Ok(())
    }
}

fn pending_from_row(row: &Row) -> Pending {
    Pending {
        id: row.get("id"),
        name: row.get("name"),
        args: row.get("args"),
        lock: row.get("lock"),
        timestamp_add: row.get("timestamp_add"),
    }
}

#[async_trait]
impl CronStore for PgStore {
    async fn purge_locks(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let db = self.db.lock().await;
        Ok(db.execute(SQL_PURGE_LOCKS, &[&cutoff]).await?)
    }

    async fn try_lock(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let db = self.db.lock().await;
        let row = db.query_opt(SQL_TRY_LOCK, &[&name, &now]).await?;
        Ok(row.map(|row| row.get("timestamp_add")))
    }

    async fn unlock(&self, name: &str, acquired: DateTime<Utc>) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        Ok(db.execute(SQL_UNLOCK, &[&name, &acquired]).await? > 0)
    }

    async fn unlock_all(&self) -> Result<u64, StoreError> {
        let db = self.db.lock().await;
        Ok(db.execute(SQL_UNLOCK_ALL, &[]).await?)
    }

    async fn locks(&self) -> Result<Vec<Lock>, StoreError> {
        let db = self.db.lock().await;
        let rows = db.query(SQL_LIST_LOCKS, &[]).await?;
        Ok(rows
            .into_iter()
            .map(|row| Lock {
                name: row.get("name"),
                timestamp_add: row.get("timestamp_add"),
            })
            .collect())
    }

    async fn enqueue(
        &self,
        name: &str,
        args: &str,
        lock: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_one(SQL_INSERT_PENDING, &[&name, &args, &lock, &now])
            .await?;
        Ok(row.get("id"))
    }

    async fn pending(&self) -> Result<Vec<Pending>, StoreError> {
        let db = self.db.lock().await;
        let rows = db.query(SQL_LIST_PENDING, &[]).await?;
        Ok(rows.iter().map(pending_from_row).collect())
    }

    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> Result<Claim, StoreError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction().await?;

        // A row locked by a concurrent tick is skipped, not waited for.
        let Some(row) = tx.query_opt(SQL_SELECT_PENDING_FOR_CLAIM, &[&id]).await? else {
            tx.rollback().await?;
            return Ok(Claim::Gone);
        };
        let job = pending_from_row(&row);

        let Some(lock) = tx.query_opt(SQL_TRY_LOCK, &[&job.lock, &now]).await? else {
            tx.rollback().await?;
            return Ok(Claim::LockHeld);
        };
        let acquired = lock.get("timestamp_add");

        tx.execute(SQL_DELETE_PENDING, &[&id]).await?;
        tx.commit().await?;
        Ok(Claim::Claimed { job, acquired })
    }

    async fn clear_pending(&self) -> Result<u64, StoreError> {
        let db = self.db.lock().await;
        Ok(db.execute(SQL_CLEAR_PENDING, &[]).await?)
    }
}

#[async_trait]
impl PageCache for PgStore {
    async fn cached_page(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let db = self.db.lock().await;
        db.execute(SQL_PURGE_CACHE, &[&now]).await?;
        let row = db.query_opt(SQL_SELECT_CACHE, &[&url]).await?;
        Ok(row.map(|row| row.get("text")))
    }

    async fn store_page(
        &self,
        url: &str,
        text: &str,
        expire: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(SQL_UPSERT_CACHE, &[&url, &text, &expire, &now])
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let db = self.db.lock().await;
        Ok(db.execute(SQL_PURGE_CACHE, &[&now]).await?)
    }
}

#[async_trait]
impl RateStore for PgStore {
    async fn upsert_rates(&self, rates: &[MpiRate]) -> Result<u64, StoreError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction().await?;
        let statement = tx.prepare(SQL_UPSERT_RATE).await?;
        let mut written = 0;
        for rate in rates {
            written += tx
                .execute(&statement, &[&rate.kind.code(), &rate.valid, &rate.rate])
                .await?;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn load_rates(&self) -> Result<RateTable, StoreError> {
        let db = self.db.lock().await;
        let rows = db.query(SQL_LIST_RATES, &[]).await?;
        rows.into_iter()
            .map(|row| {
                let kind: String = row.get("kind");
                let valid: NaiveDate = row.get("valid");
                let kind = kind
                    .parse::<RateKind>()
                    .map_err(|err| StoreError::InvalidRow(err.to_string()))?;
                Ok(MpiRate {
                    kind,
                    valid,
                    rate: row.get("rate"),
                })
            })
            .collect()
    }
}
