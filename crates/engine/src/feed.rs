//! Home-feed cache: a per-user sorted timeline of post ids.
//!
//! Each user has one sorted set in the cache store, scored by post creation
//! time in epoch milliseconds. The set is populated on demand from the
//! relational store (self-healing after eviction) and extended incrementally
//! by fan-out when a followee publishes. Fan-out is eventually consistent
//! with publish: a reader may observe the feed just before a fan-out write
//! lands. The rebuild path masks cold starts; it does not mask a missed
//! fan-out until the next rebuild.

use std::collections::HashSet;
use std::sync::Arc;

use burrow_database::{follow, post, Database, Post};
use cache_store::CacheStore;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cursor;
use crate::error::Result;

/// Page size for the home feed when the caller supplies none.
pub const DEFAULT_FEED_LIMIT: i64 = 10;

/// One page of the home feed.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// Post ids in descending score order.
    pub post_ids: Vec<String>,
    /// Cursor positioned at the oldest returned entry, or `None` when empty.
    pub cursor: Option<String>,
    /// Whether a feed population is currently in flight for this user.
    /// Clients use this to decide whether to poll again.
    pub updating: bool,
    /// Entries remaining beyond the returned page.
    pub remaining: i64,
}

/// The per-user feed cache.
#[derive(Clone)]
pub struct FeedService {
    db: Database,
    cache: Arc<dyn CacheStore>,
    rebuilding: Arc<Mutex<HashSet<String>>>,
}

impl FeedService {
    pub fn new(db: Database, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            db,
            cache,
            rebuilding: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn feed_key(user_id: &str) -> String {
        format!("feed:{user_id}")
    }

    /// Synthesize the user's feed if the cache key is absent.
    pub async fn ensure_feed_exists(&self, user_id: &str) -> Result<()> {
        if self.cache.key_exists(&Self::feed_key(user_id)).await? {
            return Ok(());
        }
        self.populate(user_id).await
    }

    /// Rebuild the user's feed from approved followees' posts plus their own.
    ///
    /// Inserts are idempotent, so running this against a live feed merges in
    /// anything missing rather than duplicating entries.
    pub async fn populate(&self, user_id: &str) -> Result<()> {
        {
            let mut rebuilding = self.rebuilding.lock().await;
            if !rebuilding.insert(user_id.to_string()) {
                // Another task is already populating this feed.
                return Ok(());
            }
        }

        let result = self.populate_inner(user_id).await;

        let mut rebuilding = self.rebuilding.lock().await;
        rebuilding.remove(user_id);
        result
    }

    async fn populate_inner(&self, user_id: &str) -> Result<()> {
        let mut authors = follow::approved_followee_ids(self.db.pool(), user_id).await?;
        authors.push(user_id.to_string());

        let entries = post::feed_entries_for_authors(self.db.pool(), &authors).await?;
        let key = Self::feed_key(user_id);
        let count = entries.len();
        for (post_id, score) in entries {
            self.cache.sorted_insert(&key, &post_id, score).await?;
        }

        info!(user_id = %user_id, entries = count, "populated home feed");
        Ok(())
    }

    /// Insert a freshly published post into every approved follower's feed
    /// (and the author's own).
    ///
    /// Only feeds that already exist are touched; an absent feed is rebuilt
    /// in full on its next read. Idempotent under retry: re-inserting the
    /// same id at the same score is a no-op duplicate.
    pub async fn fan_out_on_publish(&self, post: &Post) -> Result<Vec<String>> {
        let mut follower_ids =
            follow::approved_follower_ids(self.db.pool(), &post.author_id).await?;
        follower_ids.push(post.author_id.clone());

        let mut delivered = Vec::new();
        for follower_id in follower_ids {
            let key = Self::feed_key(&follower_id);
            if !self.cache.key_exists(&key).await? {
                continue;
            }
            self.cache
                .sorted_insert(&key, &post.id, post.created_at)
                .await?;
            delivered.push(follower_id);
        }

        debug!(post_id = %post.id, feeds = delivered.len(), "fanned out post");
        Ok(delivered)
    }

    /// Page the user's home feed.
    ///
    /// Returns entries scored strictly below the cursor (a missing or
    /// invalid cursor pages from the newest), in descending score order.
    /// The exclusive upper bound keeps pages stable while new posts are
    /// fanned out above the cursor.
    pub async fn page_home_feed(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<FeedPage> {
        self.ensure_feed_exists(user_id).await?;

        let key = Self::feed_key(user_id);
        let max = cursor::decode(cursor).unwrap_or(i64::MAX);
        let limit = match limit {
            Some(n) if n > 0 => n,
            _ => DEFAULT_FEED_LIMIT,
        };

        let entries = self.cache.sorted_range_below(&key, max, limit).await?;
        let (next_cursor, remaining) = match entries.last() {
            None => (None, 0),
            Some(oldest) => (
                Some(cursor::encode(oldest.score)),
                self.cache.sorted_count_below(&key, oldest.score).await?,
            ),
        };

        let updating = self.rebuilding.lock().await.contains(user_id);

        Ok(FeedPage {
            post_ids: entries.into_iter().map(|e| e.member).collect(),
            cursor: next_cursor,
            updating,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use burrow_database::{follow as dbfollow, user};
    use cache_store::{CacheError, MemoryCache, ScoredMember};
    use tokio::sync::{mpsc, Semaphore};

    async fn setup() -> (FeedService, Database) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol")] {
            user::create_user(db.pool(), id, name, &format!("{name}@example.com"), "hash")
                .await
                .unwrap();
        }
        let feed = FeedService::new(db.clone(), Arc::new(MemoryCache::new()));
        (feed, db)
    }

    fn make_post(id: &str, author: &str, created_at: i64) -> Post {
        Post {
            id: id.to_string(),
            author_id: author.to_string(),
            group_id: 1,
            key_id: 1,
            text: Some("ciphertext".to_string()),
            media: None,
            media_encoding: None,
            created_at,
        }
    }

    async fn approve(db: &Database, requester: &str, followee: &str) {
        let row = dbfollow::create_follow(db.pool(), requester, followee, None)
            .await
            .unwrap();
        dbfollow::approve_follow(db.pool(), followee, row.id, 1, 1, "enc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_returns_followee_and_own_posts() {
        let (feed, db) = setup().await;
        approve(&db, "u1", "u2").await;

        // u2 (followee), u1 (self), u3 (not followed).
        post::insert_post(db.pool(), &make_post("p-bob", "u2", 100)).await.unwrap();
        post::insert_post(db.pool(), &make_post("p-self", "u1", 200)).await.unwrap();
        post::insert_post(db.pool(), &make_post("p-carol", "u3", 300)).await.unwrap();

        let page = feed.page_home_feed("u1", None, Some(10)).await.unwrap();
        assert_eq!(page.post_ids, vec!["p-self", "p-bob"]);
        assert_eq!(page.remaining, 0);
        assert!(!page.updating);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_existing_feeds_only() {
        let (feed, db) = setup().await;
        approve(&db, "u1", "u2").await;
        approve(&db, "u3", "u2").await;

        // Materialize u1's feed; leave u3's cold.
        feed.ensure_feed_exists("u1").await.unwrap();

        let post = make_post("p-new", "u2", 500);
        post::insert_post(db.pool(), &post).await.unwrap();
        let delivered = feed.fan_out_on_publish(&post).await.unwrap();
        assert!(delivered.contains(&"u1".to_string()));
        assert!(!delivered.contains(&"u3".to_string()));

        let page = feed.page_home_feed("u1", None, Some(10)).await.unwrap();
        assert_eq!(page.post_ids, vec!["p-new"]);

        // u3's cold feed self-heals on first read and still sees the post.
        let page = feed.page_home_feed("u3", None, Some(10)).await.unwrap();
        assert_eq!(page.post_ids, vec!["p-new"]);
    }

    #[tokio::test]
    async fn test_fan_out_idempotent_under_retry() {
        let (feed, db) = setup().await;
        approve(&db, "u1", "u2").await;
        feed.ensure_feed_exists("u1").await.unwrap();

        let post = make_post("p-new", "u2", 500);
        post::insert_post(db.pool(), &post).await.unwrap();
        feed.fan_out_on_publish(&post).await.unwrap();
        feed.fan_out_on_publish(&post).await.unwrap();

        let page = feed.page_home_feed("u1", None, Some(10)).await.unwrap();
        assert_eq!(page.post_ids, vec!["p-new"]);
    }

    /// Cache whose sorted inserts park until the test hands out permits,
    /// signalling entry on a channel.
    struct GatedCache {
        inner: MemoryCache,
        entered: mpsc::Sender<()>,
        release: Semaphore,
    }

    #[async_trait]
    impl CacheStore for GatedCache {
        async fn sorted_insert(
            &self,
            key: &str,
            member: &str,
            score: i64,
        ) -> std::result::Result<bool, CacheError> {
            let _ = self.entered.send(()).await;
            let _permit = self.release.acquire().await.expect("semaphore closed");
            self.inner.sorted_insert(key, member, score).await
        }

        async fn sorted_range_below(
            &self,
            key: &str,
            max_exclusive: i64,
            limit: i64,
        ) -> std::result::Result<Vec<ScoredMember>, CacheError> {
            self.inner.sorted_range_below(key, max_exclusive, limit).await
        }

        async fn sorted_count_below(
            &self,
            key: &str,
            max_exclusive: i64,
        ) -> std::result::Result<i64, CacheError> {
            self.inner.sorted_count_below(key, max_exclusive).await
        }

        async fn key_exists(&self, key: &str) -> std::result::Result<bool, CacheError> {
            self.inner.key_exists(key).await
        }

        async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
            self.inner.set(key, value).await
        }

        async fn incr_by(&self, key: &str, delta: i64) -> std::result::Result<i64, CacheError> {
            self.inner.incr_by(key, delta).await
        }

        async fn delete(&self, key: &str) -> std::result::Result<bool, CacheError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_rebuild_reports_updating() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        for (id, name) in [("u1", "alice"), ("u2", "bob")] {
            user::create_user(db.pool(), id, name, &format!("{name}@example.com"), "hash")
                .await
                .unwrap();
        }
        approve(&db, "u1", "u2").await;
        post::insert_post(db.pool(), &make_post("p1", "u2", 100)).await.unwrap();

        let (entered_tx, mut entered_rx) = mpsc::channel(4);
        let gated = Arc::new(GatedCache {
            inner: MemoryCache::new(),
            entered: entered_tx,
            release: Semaphore::new(0),
        });
        let feed = FeedService::new(db.clone(), gated.clone());

        let rebuild = {
            let feed = feed.clone();
            tokio::spawn(async move { feed.populate("u1").await })
        };
        // The rebuild is parked inside its first insert.
        entered_rx.recv().await.unwrap();

        // A concurrent read sees the in-flight rebuild and an empty page.
        let page = feed.page_home_feed("u1", None, None).await.unwrap();
        assert!(page.updating);
        assert!(page.post_ids.is_empty());

        gated.release.add_permits(1);
        rebuild.await.unwrap().unwrap();

        let page = feed.page_home_feed("u1", None, None).await.unwrap();
        assert!(!page.updating);
        assert_eq!(page.post_ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_feed_paging_with_cursor() {
        let (feed, db) = setup().await;
        approve(&db, "u1", "u2").await;

        for i in 0..25 {
            post::insert_post(db.pool(), &make_post(&format!("p{i:02}"), "u2", 1000 + i))
                .await
                .unwrap();
        }

        let page1 = feed.page_home_feed("u1", None, None).await.unwrap();
        assert_eq!(page1.post_ids.len(), DEFAULT_FEED_LIMIT as usize);
        assert_eq!(page1.post_ids[0], "p24");
        assert_eq!(page1.remaining, 15);

        let page2 = feed
            .page_home_feed("u1", page1.cursor.as_deref(), None)
            .await
            .unwrap();
        assert_eq!(page2.post_ids.len(), 10);
        assert_eq!(page2.remaining, 5);

        let page3 = feed
            .page_home_feed("u1", page2.cursor.as_deref(), None)
            .await
            .unwrap();
        assert_eq!(page3.post_ids.len(), 5);
        assert_eq!(page3.remaining, 0);

        // No overlap between pages.
        let mut all: Vec<_> = page1
            .post_ids
            .iter()
            .chain(&page2.post_ids)
            .chain(&page3.post_ids)
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 25);
    }
}
