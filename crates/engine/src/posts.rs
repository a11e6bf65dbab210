//! Post publishing, aggregation, and like counters.
//!
//! Like counts are cache-first: the counter is read from the cache store and
//! lazily recomputed from `post_likes` rows whenever it is absent or
//! non-numeric. This tolerates cache eviction without a background
//! reconciliation job. Counter increments and like-row writes are not
//! transactional with each other; the recompute path is what heals a partial
//! application.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use burrow_database::{follow, group, like, post, user, Database, Post, User};
use cache_store::CacheStore;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::feed::{FeedPage, FeedService};
use crate::pagination::{paginate, Page, Pager};
use crate::realtime::Realtime;

/// Public slice of a user embedded in post responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            profile_picture: user.profile_picture,
        }
    }
}

/// A post joined with its live like count.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: i64,
}

/// Posts enriched with author info and the decryption keys the reader holds.
///
/// A group the reader cannot resolve a key for is simply absent from `keys`;
/// clients treat absence as "not decryptable".
#[derive(Debug, Clone, Serialize)]
pub struct PostBundle {
    pub posts: Vec<PostView>,
    pub users: HashMap<String, UserSummary>,
    /// group id → group symmetric key encrypted for the reader.
    pub keys: HashMap<i64, String>,
}

/// One page of the aggregated home feed.
#[derive(Debug, Clone)]
pub struct HomeFeedPage {
    pub bundle: PostBundle,
    pub cursor: Option<String>,
    pub updating: bool,
    pub remaining: i64,
}

/// Post lifecycle and aggregation.
#[derive(Clone)]
pub struct PostService {
    db: Database,
    cache: Arc<dyn CacheStore>,
    feed: FeedService,
    realtime: Arc<dyn Realtime>,
}

impl PostService {
    pub fn new(
        db: Database,
        cache: Arc<dyn CacheStore>,
        feed: FeedService,
        realtime: Arc<dyn Realtime>,
    ) -> Self {
        Self {
            db,
            cache,
            feed,
            realtime,
        }
    }

    fn counter_key(post_id: &str) -> String {
        format!("likes:{post_id}")
    }

    /// Publish an encrypted post to one of the author's groups.
    ///
    /// With no explicit group the author's default group is used. The post
    /// is keyed by the group's symmetric key, the like counter starts at
    /// zero, and the id is fanned out to every approved follower's cached
    /// feed and live connection.
    pub async fn publish_post(
        &self,
        author_id: &str,
        group_id: Option<i64>,
        text: Option<&str>,
        media: Option<&str>,
        media_encoding: Option<&str>,
    ) -> Result<Post> {
        let group = match group_id {
            Some(id) => group::get_group_owned(self.db.pool(), id, author_id).await?,
            None => group::default_group(self.db.pool(), author_id).await?,
        }
        .ok_or(EngineError::NotFound { entity: "Group" })?;

        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            group_id: group.id,
            key_id: group.sym_key_id,
            text: text.map(str::to_string),
            media: media.map(str::to_string),
            media_encoding: media_encoding.map(str::to_string),
            created_at: burrow_database::now_millis(),
        };
        post::insert_post(self.db.pool(), &post).await?;

        self.cache.set(&Self::counter_key(&post.id), "0").await?;
        let delivered = self.feed.fan_out_on_publish(&post).await?;

        let event = json!({ "type": "post", "post_id": post.id, "author_id": author_id }).to_string();
        for follower_id in &delivered {
            if follower_id != author_id {
                self.realtime.send(follower_id, &event).await;
            }
        }

        info!(post_id = %post.id, group_id = group.id, "published post");
        Ok(post)
    }

    /// Resolve raw posts into a response bundle: authors, like counts, and
    /// the group keys the reader is approved to hold.
    pub async fn post_process_posts(&self, own_id: &str, posts: Vec<Post>) -> Result<PostBundle> {
        let author_ids: Vec<String> = posts
            .iter()
            .map(|p| p.author_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let group_ids: Vec<i64> = posts
            .iter()
            .map(|p| p.group_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let users = user::get_users(self.db.pool(), &author_ids).await?;
        let group_keys = follow::approved_group_keys(self.db.pool(), own_id, &group_ids).await?;

        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            let like_count = self.like_count(&post.id).await?;
            views.push(PostView { post, like_count });
        }

        Ok(PostBundle {
            posts: views,
            users: users
                .into_iter()
                .map(|u| (u.id.clone(), UserSummary::from(u)))
                .collect(),
            keys: group_keys.into_iter().collect(),
        })
    }

    /// Live like count for a post, recomputed from rows on cache miss.
    pub async fn like_count(&self, post_id: &str) -> Result<i64> {
        let key = Self::counter_key(post_id);
        if let Some(value) = self.cache.get(&key).await? {
            if let Ok(count) = value.parse::<i64>() {
                return Ok(count);
            }
        }

        // Absent or non-numeric: reconcile from the store of record.
        let count = like::count_likes(self.db.pool(), post_id).await?;
        self.cache.set(&key, &count.to_string()).await?;
        debug!(post_id = %post_id, count, "repopulated like counter");
        Ok(count)
    }

    /// Like or unlike a post.
    ///
    /// The current state is checked optimistically before mutating; the
    /// residual race between two concurrent first-likes is closed by the
    /// (post, user) unique constraint, whose violation maps to
    /// `AlreadyLiked`. Returns the updated count.
    pub async fn toggle_like(&self, post_id: &str, user_id: &str, like: bool) -> Result<i64> {
        if post::get_post(self.db.pool(), post_id).await?.is_none() {
            return Err(EngineError::NotFound { entity: "Post" });
        }

        let already = like::has_liked(self.db.pool(), post_id, user_id).await?;
        if like && already {
            return Err(EngineError::AlreadyLiked);
        }
        if !like && !already {
            return Err(EngineError::NotLiked);
        }

        // Make sure the counter is numeric before the delta lands on it.
        self.like_count(post_id).await?;

        let key = Self::counter_key(post_id);
        if like {
            like::insert_like(self.db.pool(), post_id, user_id)
                .await
                .map_err(|e| match e {
                    burrow_database::DatabaseError::AlreadyExists { .. } => {
                        EngineError::AlreadyLiked
                    }
                    other => EngineError::Database(other),
                })?;
            Ok(self.cache.incr_by(&key, 1).await?)
        } else {
            if !like::delete_like(self.db.pool(), post_id, user_id).await? {
                return Err(EngineError::NotLiked);
            }
            Ok(self.cache.incr_by(&key, -1).await?)
        }
    }

    /// Page the reader's aggregated home feed.
    pub async fn home_feed(
        &self,
        own_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<HomeFeedPage> {
        let FeedPage {
            post_ids,
            cursor,
            updating,
            remaining,
        } = self.feed.page_home_feed(own_id, cursor, limit).await?;

        let mut posts = post::get_posts(self.db.pool(), &post_ids).await?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let bundle = self.post_process_posts(own_id, posts).await?;

        Ok(HomeFeedPage {
            bundle,
            cursor,
            updating,
            remaining,
        })
    }

    /// Page a single author's posts, enriched, newest first.
    pub async fn page_author_posts(
        &self,
        own_id: &str,
        author_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<(Page<PostView>, HashMap<i64, String>)> {
        let pager = AuthorPostsPager {
            db: self.db.clone(),
            author_id: author_id.to_string(),
        };
        let page = paginate(&pager, cursor, limit).await?;

        let bundle = self.post_process_posts(own_id, page.rows).await?;
        Ok((
            Page {
                rows: bundle.posts,
                total: page.total,
                cursor: page.cursor,
                next: page.next,
            },
            bundle.keys,
        ))
    }
}

struct AuthorPostsPager {
    db: Database,
    author_id: String,
}

#[async_trait]
impl Pager for AuthorPostsPager {
    type Item = Post;

    async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<Post>> {
        Ok(post::page_posts_by_author(self.db.pool(), &self.author_id, before, limit).await?)
    }

    async fn total(&self) -> Result<i64> {
        Ok(post::count_posts_by_author(self.db.pool(), &self.author_id).await?)
    }

    async fn exists_older(&self, before: i64) -> Result<bool> {
        Ok(post::posts_exist_older(self.db.pool(), &self.author_id, before).await?)
    }

    fn created_at(item: &Post) -> i64 {
        item.created_at
    }
}
