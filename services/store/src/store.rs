//! Persistence seams for the scheduler, the page cache and the rate tables,
//! with an in-memory implementation used by tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use legal_calc::{MpiRate, RateTable};

use crate::error::StoreError;
use crate::models::{Claim, Lock, Pending};

#[async_trait]
pub trait CronStore: Send + Sync {
    /// Deletes locks taken before `cutoff`.
    async fn purge_locks(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Inserts the lock unless it exists. `Some` carries the stored stamp,
    /// which the owner passes back to [`CronStore::unlock`].
    async fn try_lock(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Releases the lock only if it still carries the owner's stamp; a lock
    /// purged as expired and re-taken by another tick is left alone.
    async fn unlock(&self, name: &str, acquired: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn unlock_all(&self) -> Result<u64, StoreError>;

    async fn locks(&self) -> Result<Vec<Lock>, StoreError>;

    async fn enqueue(
        &self,
        name: &str,
        args: &str,
        lock: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Pending jobs, oldest first.
    async fn pending(&self) -> Result<Vec<Pending>, StoreError>;

    /// Takes the pending job's lock and removes the row as one step.
    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> Result<Claim, StoreError>;

    async fn clear_pending(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PageCache: Send + Sync {
    /// The stored page for `url` unless it has expired.
    async fn cached_page(&self, url: &str, now: DateTime<Utc>)
        -> Result<Option<String>, StoreError>;

    async fn store_page(
        &self,
        url: &str,
        text: &str,
        expire: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn upsert_rates(&self, rates: &[MpiRate]) -> Result<u64, StoreError>;

    async fn load_rates(&self) -> Result<RateTable, StoreError>;
}

#[derive(Debug, Clone)]
struct CachedPage {
    text: String,
    expire: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    locks: BTreeMap<String, DateTime<Utc>>,
    pending: Vec<Pending>,
    next_pending_id: i64,
    pages: HashMap<String, CachedPage>,
    rates: Vec<MpiRate>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CronStore for MemoryStore {
    async fn purge_locks(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.locks.len();
        state.locks.retain(|_, taken| *taken >= cutoff);
        Ok((before - state.locks.len()) as u64)
    }

    async fn try_lock(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut state = self.state.lock().await;
        if state.locks.contains_key(name) {
            return Ok(None);
        }
        state.locks.insert(name.to_string(), now);
        Ok(Some(now))
    }

    async fn unlock(&self, name: &str, acquired: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.locks.get(name) != Some(&acquired) {
            return Ok(false);
        }
        state.locks.remove(name);
        Ok(true)
    }

    async fn unlock_all(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let count = state.locks.len() as u64;
        state.locks.clear();
        Ok(count)
    }

    async fn locks(&self) -> Result<Vec<Lock>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .locks
            .iter()
            .map(|(name, taken)| Lock {
                name: name.clone(),
                timestamp_add: *taken,
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
        let mut state = self.state.lock().await;
        state.next_pending_id += 1;
        let id = state.next_pending_id;
        state.pending.push(Pending {
            id,
            name: name.to_string(),
            args: args.to_string(),
            lock: lock.to_string(),
            timestamp_add: now,
        });
        Ok(id)
    }

    async fn pending(&self) -> Result<Vec<Pending>, StoreError> {
        let state = self.state.lock().await;
        let mut pending = state.pending.clone();
        pending.sort_by_key(|job| (job.timestamp_add, job.id));
        Ok(pending)
    }

    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> Result<Claim, StoreError> {
        let mut state = self.state.lock().await;
        let Some(index) = state.pending.iter().position(|job| job.id == id) else {
            return Ok(Claim::Gone);
        };
        let lock = state.pending[index].lock.clone();
        if state.locks.contains_key(&lock) {
            return Ok(Claim::LockHeld);
        }
        state.locks.insert(lock, now);
        Ok(Claim::Claimed {
            job: state.pending.remove(index),
            acquired: now,
        })
    }

    async fn clear_pending(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let count = state.pending.len() as u64;
        state.pending.clear();
        Ok(count)
    }
}

#[async_trait]
impl PageCache for MemoryStore {
    async fn cached_page(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        state
            .pages
            .retain(|_, page| page.expire.map_or(true, |expire| expire >= now));
        Ok(state.pages.get(url).map(|page| page.text.clone()))
    }

    async fn store_page(
        &self,
        url: &str,
        text: &str,
        expire: Option<DateTime<Utc>>,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state.lock().await.pages.insert(
            url.to_string(),
            CachedPage {
                text: text.to_string(),
                expire,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.pages.len();
        state
            .pages
            .retain(|_, page| page.expire.map_or(true, |expire| expire >= now));
        Ok((before - state.pages.len()) as u64)
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn upsert_rates(&self, rates: &[MpiRate]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        for rate in rates {
            state
                .rates
                .retain(|stored| !(stored.kind == rate.kind && stored.valid == rate.valid));
            state.rates.push(*rate);
        }
        Ok(rates.len() as u64)
    }

    async fn load_rates(&self) -> Result<RateTable, StoreError> {
        Ok(self.state.lock().await.rates.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 7, 4, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let store = MemoryStore::new();
        let acquired = store.try_lock("sir", t0()).await.unwrap();
        assert_eq!(acquired, Some(t0()));
        assert_eq!(store.try_lock("sir", t0()).await.unwrap(), None);
        assert!(store.unlock("sir", t0()).await.unwrap());
        assert!(store.try_lock("sir", t0()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_owner_cannot_release_retaken_lock() {
        let store = MemoryStore::new();
        let first = t0() - Duration::minutes(40);
        store.try_lock("psj", first).await.unwrap();
        // The first owner overran the expiry; another tick purged and re-took it.
        store.purge_locks(t0() - Duration::minutes(30)).await.unwrap();
        assert_eq!(store.try_lock("psj", t0()).await.unwrap(), Some(t0()));

        assert!(!store.unlock("psj", first).await.unwrap());
        let locks = store.locks().await.unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].timestamp_add, t0());
        assert!(store.unlock("psj", t0()).await.unwrap());
        assert!(store.locks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_take_a_row_once() {
        let store = MemoryStore::new();
        let id = store.enqueue("job", "", "psj", t0()).await.unwrap();
        let (first, second) = tokio::join!(
            store.claim_pending(id, t0()),
            store.claim_pending(id, t0())
        );
        let claims = [first.unwrap(), second.unwrap()];
        let claimed = claims
            .iter()
            .filter(|claim| matches!(claim, Claim::Claimed { .. }))
            .count();
        assert_eq!(claimed, 1);
        assert!(claims
            .iter()
            .any(|claim| matches!(claim, Claim::Gone | Claim::LockHeld)));
    }

    #[tokio::test]
    async fn purge_keeps_fresh_locks() {
        let store = MemoryStore::new();
        store.try_lock("old", t0() - Duration::minutes(31)).await.unwrap();
        store.try_lock("new", t0()).await.unwrap();
        let purged = store.purge_locks(t0() - Duration::minutes(30)).await.unwrap();
        assert_eq!(purged, 1);
        let names: Vec<_> = store.locks().await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, ["new"]);
    }

    #[tokio::test]
    async fn claim_respects_lock_and_removes_row() {
        let store = MemoryStore::new();
        let id = store.enqueue("job", "1 2", "psj", t0()).await.unwrap();
        store.try_lock("psj", t0()).await.unwrap();
        assert_eq!(store.claim_pending(id, t0()).await.unwrap(), Claim::LockHeld);
        store.unlock("psj", t0()).await.unwrap();
        assert!(matches!(
            store.claim_pending(id, t0()).await.unwrap(),
            Claim::Claimed { ref job, acquired } if job.args == "1 2" && acquired == t0()
        ));
        assert!(store.pending().await.unwrap().is_empty());
        assert_eq!(store.claim_pending(id, t0()).await.unwrap(), Claim::Gone);
        assert!(store.try_lock("psj", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_pages_disappear() {
        let store = MemoryStore::new();
        let url = "https://example.test/page";
        store
            .store_page(url, "body", Some(t0() + Duration::hours(1)), t0())
            .await
            .unwrap();
        assert_eq!(
            store.cached_page(url, t0()).await.unwrap().as_deref(),
            Some("body")
        );
        assert_eq!(
            store.cached_page(url, t0() + Duration::hours(2)).await.unwrap(),
            None
        );
    }
}
