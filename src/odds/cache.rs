//! TTL cache for provider odds, keyed by `(sport_key, markets)`.
//!
//! A fresh entry (`now < expires_at`) is served from the `odds_cache` table.
//! Anything else triggers one provider fetch and a wholesale replace of the
//! entry. Concurrent misses on the same key are collapsed into one fetch.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{validate_markets, validate_sport_key, FetchOutcome, OddsProvider, Payload, UpstreamError};
use crate::storage::OddsCacheRow;
use crate::types::BookError;

/// Result of a cache lookup or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct OddsLookup {
    pub odds: Payload,
    /// Served from the cache without contacting the provider.
    pub cached: bool,
    /// Set when the provider failed and `odds` is empty for that reason.
    pub upstream_error: Option<UpstreamError>,
}

/// One row of `GET /cache/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryStatus {
    pub sport_key: String,
    pub markets: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub fresh: bool,
}

pub struct OddsCache {
    pool: SqlitePool,
    provider: Arc<dyn OddsProvider>,
    ttl: Duration,
    cache_failures: bool,
    /// Per-key fetch locks. An entry lives only while someone holds or waits
    /// on it.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

pub fn cache_key(sport_key: &str, markets: &str) -> String {
    format!("odds_{sport_key}_{markets}")
}

impl OddsCache {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn OddsProvider>,
        ttl: Duration,
        cache_failures: bool,
    ) -> Self {
        Self {
            pool,
            provider,
            ttl,
            cache_failures,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached odds when fresh, otherwise fetch and store.
    pub async fn get(&self, sport_key: &str, markets: &str) -> Result<OddsLookup, BookError> {
        self.get_at(sport_key, markets, Utc::now()).await
    }

    /// Drop any entry, fetch from the provider and store the result.
    /// Always spends one provider call.
    pub async fn force_refresh(&self, sport_key: &str, markets: &str) -> Result<OddsLookup, BookError> {
        validate_sport_key(sport_key)?;
        validate_markets(markets)?;
        let key = cache_key(sport_key, markets);

        let lock = self.key_lock(&key);
        let result: Result<OddsLookup, BookError> = async {
            let _guard = lock.lock().await;
            sqlx::query("DELETE FROM odds_cache WHERE cache_key = ?1")
                .bind(&key)
                .execute(&self.pool)
                .await?;
            info!(sport_key, markets, "Force-refreshing odds");
            self.fetch_and_store(&key, sport_key, markets, Utc::now()).await
        }
        .await;
        self.release_key(&key, lock);
        result
    }

    /// Every stored entry, freshness evaluated now.
    pub async fn entries(&self) -> Result<Vec<CacheEntryStatus>, BookError> {
        let now = Utc::now();
        let rows: Vec<OddsCacheRow> =
            sqlx::query_as("SELECT * FROM odds_cache ORDER BY sport_key, markets")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| CacheEntryStatus {
                fresh: now < row.expires_at,
                sport_key: row.sport_key,
                markets: row.markets,
                cached_at: row.cached_at,
                expires_at: row.expires_at,
            })
            .collect())
    }

    async fn get_at(
        &self,
        sport_key: &str,
        markets: &str,
        now: DateTime<Utc>,
    ) -> Result<OddsLookup, BookError> {
        validate_sport_key(sport_key)?;
        validate_markets(markets)?;
        let key = cache_key(sport_key, markets);

        if let Some(odds) = self.load_fresh(&key, now).await? {
            info!(sport_key, markets, "Returning cached odds");
            return Ok(OddsLookup { odds, cached: true, upstream_error: None });
        }

        let lock = self.key_lock(&key);
        let result: Result<OddsLookup, BookError> = async {
            let _guard = lock.lock().await;
            // Another request may have filled the entry while we waited.
            if let Some(odds) = self.load_fresh(&key, now).await? {
                debug!(sport_key, markets, "Odds filled by concurrent fetch");
                return Ok(OddsLookup { odds, cached: true, upstream_error: None });
            }
            self.fetch_and_store(&key, sport_key, markets, now).await
        }
        .await;
        self.release_key(&key, lock);
        result
    }

    async fn load_fresh(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Payload>, BookError> {
        let row: Option<OddsCacheRow> = sqlx::query_as("SELECT * FROM odds_cache WHERE cache_key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        if now >= row.expires_at {
            debug!(key, expires_at = %row.expires_at, "Cached odds expired");
            return Ok(None);
        }
        let odds = serde_json::from_str(&row.data)
            .map_err(|e| BookError::Corrupt(format!("odds cache {key}: {e}")))?;
        Ok(Some(odds))
    }

    async fn fetch_and_store(
        &self,
        key: &str,
        sport_key: &str,
        markets: &str,
        now: DateTime<Utc>,
    ) -> Result<OddsLookup, BookError> {
        let outcome = self.provider.fetch_odds(sport_key, markets).await;
        let store = matches!(outcome, FetchOutcome::Fetched(_)) || self.cache_failures;
        let (odds, upstream_error) = outcome.into_parts();

        if let Some(ref err) = upstream_error {
            warn!(sport_key, markets, error = %err, cached = store, "Odds fetch failed");
        }

        if store {
            let data = serde_json::to_string(&odds)
                .map_err(|e| BookError::Corrupt(format!("odds payload for {key}: {e}")))?;
            sqlx::query(
                "INSERT OR REPLACE INTO odds_cache
                    (cache_key, sport_key, markets, data, cached_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(key)
            .bind(sport_key)
            .bind(markets)
            .bind(data)
            .bind(now)
            .bind(now + self.ttl)
            .execute(&self.pool)
            .await?;
            debug!(key, games = odds.len(), "Odds cached");
        }

        Ok(OddsLookup { odds, cached: false, upstream_error })
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }

    fn release_key(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // The map and `lock` are the only owners left: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            map.remove(key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
