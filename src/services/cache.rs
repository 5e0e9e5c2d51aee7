use crate::models::DailyPickEntry;
use crate::services::store::{DailyPickCache, StorageError};
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Cache(CacheError::RedisError(err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Cache(CacheError::SerializationError(err))
    }
}

/// Replace the entry only if it still names the expected candidate.
/// Returns the entry stored afterwards.
const REPLACE_IF_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local decoded = cjson.decode(current)
    if decoded['candidateId'] ~= ARGV[1] then
        return current
    end
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return ARGV[2]
"#;

/// Flip the viewed flag in place, keeping the TTL
const MARK_VIEWED_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
local decoded = cjson.decode(current)
decoded['viewed'] = true
redis.call('SET', KEYS[1], cjson.encode(decoded), 'KEEPTTL')
return 1
"#;

/// Two-tier daily pick cache
///
/// Redis (L2) is the source of truth shared across instances and carries the
/// atomic put-if-absent and compare-and-swap. The in-process L1 only serves
/// reads and is refreshed on every write through this instance.
pub struct CacheManager {
    // Store ConnectionManager in a Mutex for interior mutability
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    l1_cache: moka::future::Cache<String, DailyPickEntry>,
    ttl_secs: u64,
    replace_if_script: redis::Script,
    mark_viewed_script: redis::Script,
}

impl CacheManager {
    /// Create a new cache manager
    ///
    /// `ttl_secs` bounds how long a daily pick lives in Redis, `l1_ttl_secs`
    /// how long this instance may serve it without asking Redis.
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64, l1_ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(l1_ttl_secs))
            .build();

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            l1_cache,
            ttl_secs,
            replace_if_script: redis::Script::new(REPLACE_IF_SCRIPT),
            mark_viewed_script: redis::Script::new(MARK_VIEWED_SCRIPT),
        })
    }

    /// Ping Redis
    pub async fn health_check(&self) -> Result<bool, CacheError> {
        let mut conn = self.redis.lock().await;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(pong == "PONG")
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            ttl_secs: self.ttl_secs,
        }
    }

    async fn read_l2(&self, key: &str) -> Result<Option<DailyPickEntry>, StorageError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await?;
        drop(conn);

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DailyPickCache for CacheManager {
    async fn get(&self, seeker: &str, date: NaiveDate) -> Result<Option<DailyPickEntry>, StorageError> {
        let key = CacheKey::daily_pick(seeker, date);

        // Try L1 cache first
        if let Some(entry) = self.l1_cache.get(&key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(Some(entry));
        }

        let entry = self.read_l2(&key).await?;
        match &entry {
            Some(found) => {
                tracing::trace!("L2 cache hit: {}", key);
                self.l1_cache.insert(key, found.clone()).await;
            }
            None => tracing::trace!("Cache miss: {}", key),
        }
        Ok(entry)
    }

    async fn put_if_absent(
        &self,
        seeker: &str,
        date: NaiveDate,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError> {
        let key = CacheKey::daily_pick(seeker, date);
        let json = serde_json::to_string(entry)?;

        let mut conn = self.redis.lock().await;
        let stored: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let current = if stored.is_some() {
            entry.clone()
        } else {
            // Someone else got there first
            match self.read_l2(&key).await? {
                Some(existing) => existing,
                None => entry.clone(),
            }
        };

        self.l1_cache.insert(key, current.clone()).await;
        Ok(current)
    }

    async fn replace_if(
        &self,
        seeker: &str,
        date: NaiveDate,
        expected_candidate: &str,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError> {
        let key = CacheKey::daily_pick(seeker, date);
        let json = serde_json::to_string(entry)?;

        let mut conn = self.redis.lock().await;
        let stored: String = self
            .replace_if_script
            .key(&key)
            .arg(expected_candidate)
            .arg(&json)
            .arg(self.ttl_secs)
            .invoke_async(&mut *conn)
            .await?;
        drop(conn);

        let current: DailyPickEntry = serde_json::from_str(&stored)?;
        self.l1_cache.insert(key, current.clone()).await;
        Ok(current)
    }

    async fn mark_viewed(&self, seeker: &str, date: NaiveDate) -> Result<bool, StorageError> {
        let key = CacheKey::daily_pick(seeker, date);

        let mut conn = self.redis.lock().await;
        let updated: i64 = self.mark_viewed_script.key(&key).invoke_async(&mut *conn).await?;
        drop(conn);

        self.l1_cache.invalidate(&key).await;
        Ok(updated == 1)
    }

    async fn purge_before(&self, date: NaiveDate) -> Result<u64, StorageError> {
        let mut conn = self.redis.lock().await;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(CacheKey::daily_pick_pattern())
            .query_async(&mut *conn)
            .await?;

        let stale: Vec<String> = keys
            .into_iter()
            .filter(|key| CacheKey::daily_pick_date(key).is_some_and(|d| d < date))
            .collect();

        if !stale.is_empty() {
            let _: () = redis::cmd("DEL").arg(&stale).query_async(&mut *conn).await?;
        }
        drop(conn);

        for key in &stale {
            self.l1_cache.invalidate(key).await;
        }

        tracing::debug!("Purged {} daily picks before {}", stale.len(), date);
        Ok(stale.len() as u64)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub ttl_secs: u64,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    const DAILY_PICK_PREFIX: &'static str = "daily_pick";

    /// Build a cache key for a seeker's daily pick
    pub fn daily_pick(seeker: &str, date: NaiveDate) -> String {
        format!("{}:{}:{}", Self::DAILY_PICK_PREFIX, date.format("%Y-%m-%d"), seeker)
    }

    /// Pattern matching every daily pick key
    pub fn daily_pick_pattern() -> String {
        format!("{}:*", Self::DAILY_PICK_PREFIX)
    }

    /// Date component of a daily pick key
    pub fn daily_pick_date(key: &str) -> Option<NaiveDate> {
        let rest = key.strip_prefix(Self::DAILY_PICK_PREFIX)?.strip_prefix(':')?;
        let (date, _) = rest.split_once(':')?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }
}
