//! Record of activities this server has seen.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::KeysInterface;
use fred::types::{Expiration, SetOptions};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Activity store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The id was recorded before.
    #[error("activity {0} already exists")]
    AlreadyExists(String),
    /// The store could not be reached.
    #[error("activity store error: {0}")]
    Backend(String),
}

/// Idempotent record of activity ids.
///
/// `exists` may answer `false` for activities that are in fact known; callers
/// must then rely on `insert` reporting [`StoreError::AlreadyExists`].
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Whether `id` was recorded.
    async fn exists(&self, id: &Url) -> Result<bool, StoreError>;

    /// Record `activity` under `id`. Fails with `AlreadyExists` if `id` is
    /// already recorded.
    async fn insert(&self, id: &Url, activity: &Value) -> Result<(), StoreError>;
}

/// How long a recorded id is remembered when no TTL is given.
pub const DEFAULT_DEDUPE_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// In-process activity id record.
///
/// Only ids are kept, each for the store's TTL, matching
/// [`RedisActivityStore`].
pub struct MemoryActivityStore {
    ttl: Duration,
    seen: Mutex<Seen>,
}

/// Recorded ids, and the same ids in expiry order.
#[derive(Default)]
struct Seen {
    ids: HashSet<Url>,
    expiries: VecDeque<(Instant, Url)>,
}

impl Seen {
    fn forget_expired(&mut self, now: Instant) {
        while self.expiries.front().is_some_and(|(expiry, _)| *expiry <= now) {
            if let Some((_, id)) = self.expiries.pop_front() {
                self.ids.remove(&id);
            }
        }
    }
}

impl Default for MemoryActivityStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_DEDUPE_TTL)
    }
}

impl MemoryActivityStore {
    /// A store remembering ids for [`DEFAULT_DEDUPE_TTL`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store remembering ids for `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Number of ids currently remembered.
    pub async fn len(&self) -> usize {
        let mut seen = self.seen.lock().await;
        seen.forget_expired(Instant::now());
        seen.ids.len()
    }

    /// Whether no id is currently remembered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn exists(&self, id: &Url) -> Result<bool, StoreError> {
        let mut seen = self.seen.lock().await;
        seen.forget_expired(Instant::now());
        Ok(seen.ids.contains(id))
    }

    async fn insert(&self, id: &Url, _activity: &Value) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        seen.forget_expired(now);

        if !seen.ids.insert(id.clone()) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        seen.expiries.push_back((now + self.ttl, id.clone()));
        Ok(())
    }
}

/// Redis-backed activity id record.
///
/// Only ids are kept, each for the given TTL. `exists` always answers `false`;
/// the `SET NX` in `insert` is the only check, so the two never race.
#[derive(Clone)]
pub struct RedisActivityStore {
    redis: Arc<RedisClient>,
    prefix: String,
    ttl_secs: i64,
}

impl RedisActivityStore {
    /// Keys are written under `prefix`, each expiring after `ttl`.
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    fn key(&self, id: &Url) -> String {
        activity_key(&self.prefix, id)
    }
}

fn activity_key(prefix: &str, id: &Url) -> String {
    format!("{prefix}:activity:{id}")
}

#[async_trait]
impl ActivityStore for RedisActivityStore {
    async fn exists(&self, _id: &Url) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn insert(&self, id: &Url, _activity: &Value) -> Result<(), StoreError> {
        // NX returns None if the key already exists, Some("OK") if set
        let result: Option<String> = self
            .redis
            .set(
                self.key(id),
                "1",
                Some(Expiration::EX(self.ttl_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.is_some() {
            debug!(activity_id = %id, "New activity recorded");
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(id.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn like(id: &Url) -> Value {
        json!({ "type": "Like", "id": id.as_str() })
    }

    #[tokio::test]
    async fn test_memory_insert_is_idempotent() {
        let store = MemoryActivityStore::new();
        let id = Url::parse("https://remote.example/activities/1").unwrap();

        assert!(!store.exists(&id).await.unwrap());
        store.insert(&id, &like(&id)).await.unwrap();
        assert!(store.exists(&id).await.unwrap());

        let err = store.insert(&id, &like(&id)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_ids_expire() {
        let store = MemoryActivityStore::with_ttl(Duration::from_secs(60));
        let first = Url::parse("https://remote.example/activities/1").unwrap();
        let second = Url::parse("https://remote.example/activities/2").unwrap();

        store.insert(&first, &like(&first)).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        store.insert(&second, &like(&second)).await.unwrap();
        assert_eq!(store.len().await, 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!store.exists(&first).await.unwrap());
        assert!(store.exists(&second).await.unwrap());
        assert_eq!(store.len().await, 1);

        // Forgotten ids can be recorded again.
        store.insert(&first, &like(&first)).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_redis_key_layout() {
        let id = Url::parse("https://remote.example/activities/1").unwrap();
        assert_eq!(
            activity_key("emissary", &id),
            "emissary:activity:https://remote.example/activities/1"
        );
    }
}
