//! Post storage.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Post;

const POST_COLUMNS: &str =
    "id, author_id, group_id, key_id, text, media, media_encoding, created_at";

/// Persist a post.
pub async fn insert_post(pool: &SqlitePool, post: &Post) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO posts (id, author_id, group_id, key_id, text, media, media_encoding, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.id)
    .bind(&post.author_id)
    .bind(post.group_id)
    .bind(post.key_id)
    .bind(&post.text)
    .bind(&post.media)
    .bind(&post.media_encoding)
    .bind(post.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a post by ID.
pub async fn get_post(pool: &SqlitePool, id: &str) -> Result<Option<Post>> {
    let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");

    let post = sqlx::query_as::<_, Post>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(post)
}

/// Batch-fetch posts by ID. Missing ids are simply absent; order is not
/// preserved (the caller re-orders by score).
pub async fn get_posts(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Post>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id IN ({placeholders})");

    let mut q = sqlx::query_as::<_, Post>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// (post id, created_at) pairs for all posts by the given authors, used to
/// rebuild an evicted feed at the stored scores.
pub async fn feed_entries_for_authors(
    pool: &SqlitePool,
    author_ids: &[String],
) -> Result<Vec<(String, i64)>> {
    if author_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; author_ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT id, created_at
        FROM posts
        WHERE author_id IN ({placeholders})
        ORDER BY created_at DESC
        "#,
    );

    let mut q = sqlx::query_as::<_, (String, i64)>(&query);
    for id in author_ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Page a single author's posts, newest first, strictly older than `before`.
pub async fn page_posts_by_author(
    pool: &SqlitePool,
    author_id: &str,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<Post>> {
    let query = format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE author_id = ? AND created_at < ? ORDER BY created_at DESC LIMIT ?"
    );

    let posts = sqlx::query_as::<_, Post>(&query)
        .bind(author_id)
        .bind(before.unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(posts)
}

/// Total posts by an author, ignoring any cursor.
pub async fn count_posts_by_author(pool: &SqlitePool, author_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM posts WHERE author_id = ?
        "#,
    )
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Whether the author has at least one post strictly older than `before`.
pub async fn posts_exist_older(pool: &SqlitePool, author_id: &str, before: i64) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1 FROM posts WHERE author_id = ? AND created_at < ? LIMIT 1
        "#,
    )
    .bind(author_id)
    .bind(before)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}
