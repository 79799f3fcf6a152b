// Contribution history cache.
// Decides per user whether to serve, refetch everything, or refresh only recent years.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contributions::{ContributionHistory, ContributionSource};
use crate::error::Result;

use super::store::KeyValueStore;

/// Minimum age before a user's current year is refetched: 1 hour.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Store key of a user's serialized history.
pub fn history_key(user: &str) -> String {
    user.to_ascii_lowercase()
}

/// Store key of a user's last refresh timestamp.
pub fn refreshed_at_key(user: &str) -> String {
    format!("{}_lastFetchTime", user.to_ascii_lowercase())
}

/// Persisted history plus the time it was last refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub history: ContributionHistory,
    pub last_refreshed_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Check if the record is younger than `window` at `now`.
    ///
    /// A timestamp ahead of `now` counts as fresh: the stored value never
    /// decreases, so treating it as stale would refetch on every request until
    /// the clock catches up.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match now.signed_duration_since(self.last_refreshed_at).to_std() {
            Ok(elapsed) => elapsed < window,
            Err(_) => true,
        }
    }
}

/// How a history was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing cached: every contribution year was fetched.
    Cold,
    /// Served from cache without touching upstream.
    Fresh,
    /// Stale cache: recent years refetched and merged.
    Refreshed,
}

/// Result of a cache refresh.
#[derive(Debug, Clone)]
pub struct CachedHistory {
    pub history: ContributionHistory,
    pub refreshed_at: DateTime<Utc>,
    pub status: CacheStatus,
    /// False when the store rejected the write and the data was served uncached.
    pub persisted: bool,
}

/// Freshness-bounded cache of contribution histories, one upstream refresh per user at a time.
pub struct ContributionCache {
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn ContributionSource>,
    freshness_window: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ContributionCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn ContributionSource>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            store,
            source,
            freshness_window,
            locks: DashMap::new(),
        }
    }

    /// Return the user's history, refreshing it from upstream if needed.
    pub async fn refresh(&self, user: &str) -> Result<CachedHistory> {
        self.refresh_at(user, Utc::now()).await
    }

    /// Same as [`refresh`](Self::refresh) with an explicit clock.
    pub async fn refresh_at(&self, user: &str, now: DateTime<Utc>) -> Result<CachedHistory> {
        let key = history_key(user);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user, now).await
        };

        // Drop the entry once no other request holds or waits on it.
        drop(lock);
        self.locks.remove_if(&key, |_, held| Arc::strong_count(held) == 1);
        result
    }

    async fn refresh_locked(&self, user: &str, now: DateTime<Utc>) -> Result<CachedHistory> {
        let (history, status, previous) = match self.load(user).await? {
            Some(record) if record.is_fresh(now, self.freshness_window) => {
                debug!(user, "serving cached contribution history");
                return Ok(CachedHistory {
                    history: record.history,
                    refreshed_at: record.last_refreshed_at,
                    status: CacheStatus::Fresh,
                    persisted: true,
                });
            }
            Some(record) => {
                let history = self
                    .refresh_recent_years(user, record.history, record.last_refreshed_at, now)
                    .await?;
                (history, CacheStatus::Refreshed, Some(record.last_refreshed_at))
            }
            None => {
                info!(user, "no cached history, fetching all contribution years");
                let history = self.source.fetch_history(user, now).await?;
                (history, CacheStatus::Cold, None)
            }
        };

        let refreshed_at = previous.map_or(now, |prev| prev.max(now));
        let persisted = match self.persist(user, &history, refreshed_at).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    user,
                    error = %e,
                    "failed to persist contribution history, serving uncached result"
                );
                false
            }
        };

        Ok(CachedHistory {
            history,
            refreshed_at,
            status,
            persisted,
        })
    }

    /// Refetch every year from the last refresh through the current one.
    async fn refresh_recent_years(
        &self,
        user: &str,
        mut history: ContributionHistory,
        last_refreshed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ContributionHistory> {
        let current_year = now.year();
        let years = last_refreshed_at.year().min(current_year)..=current_year;

        info!(user, years = ?years, "cached history is stale, refreshing");
        for year in years {
            let days = self.source.fetch_year(user, year, now).await?;
            history.replace_year(year, days);
        }
        Ok(history)
    }

    async fn load(&self, user: &str) -> Result<Option<CacheRecord>> {
        let Some(history_json) = self.store.get(&history_key(user)).await? else {
            return Ok(None);
        };
        let Some(stamp_json) = self.store.get(&refreshed_at_key(user)).await? else {
            warn!(user, "cached history has no refresh timestamp, treating as cold");
            return Ok(None);
        };

        let history = match serde_json::from_str::<ContributionHistory>(&history_json) {
            Ok(history) => history,
            Err(e) => {
                warn!(user, error = %e, "unreadable cached history, treating as cold");
                return Ok(None);
            }
        };
        let last_refreshed_at = match serde_json::from_str::<DateTime<Utc>>(&stamp_json) {
            Ok(stamp) => stamp,
            Err(e) => {
                warn!(user, error = %e, "unreadable refresh timestamp, treating as cold");
                return Ok(None);
            }
        };

        Ok(Some(CacheRecord {
            history,
            last_refreshed_at,
        }))
    }

    async fn persist(
        &self,
        user: &str,
        history: &ContributionHistory,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        let entries = [
            (history_key(user), serde_json::to_string(history)?),
            (refreshed_at_key(user), serde_json::to_string(&refreshed_at)?),
        ];
        self.store.set_all(&entries).await
    }
}
