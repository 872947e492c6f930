//! HTTP page cache: pages are fetched once and served from the store until
//! they expire.

use chrono::{DateTime, Duration, Utc};

use legal_store::PageCache;

use crate::error::JobError;

/// Returns the page at `url`, fetching and storing it when no fresh copy
/// exists. Without a lifespan the stored copy never expires.
pub async fn fetch_cached(
    cache: &dyn PageCache,
    http: &reqwest::Client,
    url: &str,
    lifespan: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<String, JobError> {
    if let Some(text) = cache.cached_page(url, now).await? {
        tracing::debug!(url, "page served from cache");
        return Ok(text);
    }

    let response = http.get(url).send().await?.error_for_status()?;
    let text = response.text().await?;
    let expire = lifespan.map(|lifespan| now + lifespan);
    cache.store_page(url, &text, expire, now).await?;
    tracing::debug!(url, bytes = text.len(), "page fetched");
    Ok(text)
}
