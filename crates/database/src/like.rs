//! Post like storage.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::now_millis;

/// Insert a like row.
///
/// The (post, user) unique constraint closes the concurrent first-like race;
/// a violation surfaces as `AlreadyExists` for the caller to map to a
/// conflict rather than a generic failure.
pub async fn insert_like(pool: &SqlitePool, post_id: &str, user_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO post_likes (post_id, user_id, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(now_millis())
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::from_unique_violation(e, "PostLike", format!("{post_id}/{user_id}"))
    })?;

    Ok(())
}

/// Delete a like row. Returns true if one existed.
pub async fn delete_like(pool: &SqlitePool, post_id: &str, user_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM post_likes
        WHERE post_id = ? AND user_id = ?
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether the user has liked the post.
pub async fn has_liked(pool: &SqlitePool, post_id: &str, user_id: &str) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1 FROM post_likes WHERE post_id = ? AND user_id = ?
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Count likes on a post. Source of truth for cached counters.
pub async fn count_likes(pool: &SqlitePool, post_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM post_likes WHERE post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
