//! SQLite persistence layer for Burrow.
//!
//! This crate provides async database operations for users, groups, follows,
//! grants, keys, posts, and conversations using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{user, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:burrow.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let alice = user::create_user(
//!         db.pool(),
//!         "c27fb365-0c84-4cf2-8555-814bb065e448",
//!         "alice",
//!         "alice@example.com",
//!         "argon2-hash",
//!     )
//!     .await?;
//!     println!("registered {}", alice.username);
//!
//!     Ok(())
//! }
//! ```

pub mod conversation;
pub mod error;
pub mod follow;
pub mod grant;
pub mod group;
pub mod keys;
pub mod like;
pub mod models;
pub mod notification;
pub mod post;
pub mod user;

pub use error::{DatabaseError, Result};
pub use follow::FollowFilter;
pub use models::{
    Conversation, GroupFollowApproval, GroupPolicy, Message, Post, PostLike, ProfileGrant, User,
    UserEcdhKey, UserNotification, UserSetting, UserSymKey,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared handle over the SQLite connection pool.
///
/// Cheap to clone; every engine service holds one and issues queries through
/// the free functions in this crate's modules.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size, sized for request-parallel handlers sharing the
    /// pool.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// `url` takes the form `sqlite:path/to/db.sqlite?mode=rwc`; tests use
    /// `sqlite::memory:`. Foreign keys are enforced on every connection.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect with an explicit pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "database pool ready");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations. Call once after connecting.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("migrations applied");
        Ok(())
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time as epoch milliseconds, the timestamp unit used throughout.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
