//! Feed, follow, and access-grant engine for Burrow.
//!
//! This crate is the core of the social backend: it maintains each user's
//! cached home feed, runs the follow request/approval state machine, and
//! keeps the grant ledger that decides who can decrypt whose encrypted
//! profile and group material. Transports (REST/GraphQL/WebSocket) sit above
//! it; the relational store and cache store sit below it behind the
//! `database` and `cache-store` crates.
//!
//! # Architecture
//!
//! ```text
//! request_follow ──→ FollowService ──→ GrantLedger ──→ exchange-key claims
//!                         │
//! approve_follow ─────────┤──→ FeedService.populate (requester)
//!                         └──→ Notifier (settings-gated) ──→ Realtime
//!
//! publish_post ──→ PostService ──→ FeedService.fan_out_on_publish
//!                      │                  │
//! home_feed ───────────┴──→ pagination ──→ cache sorted set
//!                      └──→ post_process_posts (users + keys + like counts)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use burrow_database::Database;
//! use cache_store::MemoryCache;
//! use engine::{ConnectionRegistry, Engine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite:burrow.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let engine = Engine::new(
//!         db,
//!         Arc::new(MemoryCache::new()),
//!         Arc::new(ConnectionRegistry::new()),
//!     );
//!
//!     let feed = engine.posts.home_feed("user-id", None, None).await?;
//!     println!("{} posts", feed.bundle.posts.len());
//!     Ok(())
//! }
//! ```

pub mod conversations;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod follow;
pub mod grants;
pub mod keys;
pub mod notify;
pub mod pagination;
pub mod posts;
pub mod realtime;

pub use conversations::ConversationService;
pub use error::{EngineError, Result};
pub use feed::{FeedPage, FeedService, DEFAULT_FEED_LIMIT};
pub use follow::FollowService;
pub use grants::{GrantLedger, GrantedProfile, ProfileGrantView};
pub use keys::{KeyFilter, KeyRegistry, MAX_EXCHANGE_KEYS};
pub use notify::{Notifier, NotifyAction};
pub use pagination::{paginate, Page, Pager, DEFAULT_LIMIT};
pub use posts::{HomeFeedPage, PostBundle, PostService, PostView, UserSummary};
pub use realtime::{ConnectionRegistry, NoOpRealtime, Realtime};

// Re-export commonly used types from dependencies
pub use burrow_database::{
    Conversation, Database, GroupFollowApproval, GroupPolicy, Message, Post, ProfileGrant, User,
    UserEcdhKey,
};
pub use cache_store::{CacheStore, MemoryCache};

use std::sync::Arc;

/// All engine services wired over one database, cache, and realtime registry.
#[derive(Clone)]
pub struct Engine {
    pub keys: KeyRegistry,
    pub grants: GrantLedger,
    pub feed: FeedService,
    pub follow: FollowService,
    pub posts: PostService,
    pub conversations: ConversationService,
    pub notifier: Notifier,
}

impl Engine {
    pub fn new(db: Database, cache: Arc<dyn CacheStore>, realtime: Arc<dyn Realtime>) -> Self {
        let keys = KeyRegistry::new(db.clone());
        let grants = GrantLedger::new(db.clone());
        let feed = FeedService::new(db.clone(), cache.clone());
        let notifier = Notifier::new(db.clone(), realtime.clone());
        let follow = FollowService::new(
            db.clone(),
            grants.clone(),
            feed.clone(),
            notifier.clone(),
        );
        let posts = PostService::new(db.clone(), cache, feed.clone(), realtime.clone());
        let conversations = ConversationService::new(db, notifier.clone(), realtime);

        Self {
            keys,
            grants,
            feed,
            follow,
            posts,
            conversations,
            notifier,
        }
    }
}
