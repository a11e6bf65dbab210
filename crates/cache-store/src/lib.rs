//! Sorted-set and counter cache for Burrow.
//!
//! The feed engine treats its cache as an external service with two
//! namespaces: per-user sorted sets (score = epoch milliseconds, member =
//! post id) and plain string values used as integer counters. The
//! [`CacheStore`] trait captures exactly that contract; [`MemoryCache`] is a
//! concurrency-safe in-process implementation used in production single-node
//! deployments and in tests.
//!
//! # Example
//!
//! ```
//! use cache_store::{CacheStore, MemoryCache};
//!
//! # async fn example() -> Result<(), cache_store::CacheError> {
//! let cache = MemoryCache::new();
//! cache.sorted_insert("feed:u1", "post-a", 100).await?;
//! cache.sorted_insert("feed:u1", "post-b", 200).await?;
//!
//! let page = cache.sorted_range_below("feed:u1", i64::MAX, 10).await?;
//! assert_eq!(page[0].member, "post-b");
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A counter operation hit a value that is not an integer.
    #[error("non-numeric value at key: {key}")]
    NonNumeric { key: String },

    /// Backend failure (connection loss, protocol error).
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A sorted-set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// Contract the engine requires of its cache service.
///
/// Abstracted to support different backends (in-process, Redis, tests).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert a member into a sorted set at the given score.
    ///
    /// Re-inserting an existing member is a no-op duplicate (the score is
    /// updated if it changed). Returns true if the member was newly added.
    async fn sorted_insert(&self, key: &str, member: &str, score: i64)
        -> Result<bool, CacheError>;

    /// Members scored strictly below `max_exclusive`, in descending score
    /// order, limited to `limit`.
    async fn sorted_range_below(
        &self,
        key: &str,
        max_exclusive: i64,
        limit: i64,
    ) -> Result<Vec<ScoredMember>, CacheError>;

    /// Number of members scored strictly below `max_exclusive`.
    async fn sorted_count_below(&self, key: &str, max_exclusive: i64) -> Result<i64, CacheError>;

    /// Whether a key exists in either namespace.
    async fn key_exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Get a plain value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a plain value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Add `delta` to an integer value, treating a missing key as 0.
    ///
    /// Fails with `NonNumeric` if the stored value is not an integer.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Delete a key from either namespace. Returns true if one existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    by_score: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            None => {
                self.by_score.insert((score, member.to_string()));
                true
            }
            Some(old) => {
                if old != score {
                    self.by_score.remove(&(old, member.to_string()));
                    self.by_score.insert((score, member.to_string()));
                }
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    sets: HashMap<String, SortedSet>,
    values: HashMap<String, String>,
}

/// In-process cache with the same semantics a Redis backend would have.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: RwLock<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn sorted_insert(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> Result<bool, CacheError> {
        let mut inner = self.inner.write().await;
        let set = inner.sets.entry(key.to_string()).or_default();
        Ok(set.insert(member, score))
    }

    async fn sorted_range_below(
        &self,
        key: &str,
        max_exclusive: i64,
        limit: i64,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        let inner = self.inner.read().await;
        let Some(set) = inner.sets.get(key) else {
            return Ok(Vec::new());
        };

        let page = set
            .by_score
            .range(..(max_exclusive, String::new()))
            .rev()
            .take(limit.max(0) as usize)
            .map(|(score, member)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect();

        Ok(page)
    }

    async fn sorted_count_below(&self, key: &str, max_exclusive: i64) -> Result<i64, CacheError> {
        let inner = self.inner.read().await;
        let Some(set) = inner.sets.get(key) else {
            return Ok(0);
        };

        Ok(set.by_score.range(..(max_exclusive, String::new())).count() as i64)
    }

    async fn key_exists(&self, key: &str) -> Result<bool, CacheError> {
        let inner = self.inner.read().await;
        Ok(inner.sets.contains_key(key) || inner.values.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let inner = self.inner.read().await;
        Ok(inner.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.write().await;
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut inner = self.inner.write().await;
        let current = match inner.values.get(key) {
            None => 0,
            Some(value) => value.parse::<i64>().map_err(|_| CacheError::NonNumeric {
                key: key.to_string(),
            })?,
        };

        let next = current + delta;
        inner.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.write().await;
        let had_set = inner.sets.remove(key).is_some();
        let had_value = inner.values.remove(key).is_some();
        Ok(had_set || had_value)
    }
}
