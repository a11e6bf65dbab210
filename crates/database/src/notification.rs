//! Notification records and per-action settings.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{UserNotification, UserSetting};
use crate::now_millis;

/// Whether notifications for an action are enabled for a user.
///
/// A missing settings row means enabled.
pub async fn action_enabled(pool: &SqlitePool, user_id: &str, action: &str) -> Result<bool> {
    let enabled = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT enabled FROM user_settings WHERE user_id = ? AND action = ?
        "#,
    )
    .bind(user_id)
    .bind(action)
    .fetch_optional(pool)
    .await?;

    Ok(enabled.unwrap_or(true))
}

/// Enable or disable notifications for an action.
pub async fn set_action_enabled(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    enabled: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_settings (user_id, action, enabled)
        VALUES (?, ?, ?)
        ON CONFLICT (user_id, action) DO UPDATE SET enabled = excluded.enabled
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(enabled)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a delivered notification.
pub async fn insert_notification(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    content: &str,
    payload: Option<&str>,
) -> Result<UserNotification> {
    let created_at = now_millis();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO user_notifications (user_id, action, content, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(content)
    .bind(payload)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(UserNotification {
        id,
        user_id: user_id.to_string(),
        action: action.to_string(),
        content: content.to_string(),
        payload: payload.map(str::to_string),
        created_at,
    })
}

/// Recent notifications for a user, newest first.
pub async fn recent_notifications(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<UserNotification>> {
    let rows = sqlx::query_as::<_, UserNotification>(
        r#"
        SELECT id, user_id, action, content, payload, created_at
        FROM user_notifications
        WHERE user_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All explicit settings rows for a user.
pub async fn list_settings(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserSetting>> {
    let rows = sqlx::query_as::<_, UserSetting>(
        r#"
        SELECT user_id, action, enabled
        FROM user_settings
        WHERE user_id = ?
        ORDER BY action
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{user, Database};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        user::create_user(db.pool(), "u1", "alice", "a@example.com", "hash")
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_missing_setting_means_enabled() {
        let db = test_db().await;

        assert!(action_enabled(db.pool(), "u1", "followed").await.unwrap());

        set_action_enabled(db.pool(), "u1", "followed", false).await.unwrap();
        assert!(!action_enabled(db.pool(), "u1", "followed").await.unwrap());
        // Other actions are unaffected.
        assert!(action_enabled(db.pool(), "u1", "approved").await.unwrap());

        set_action_enabled(db.pool(), "u1", "followed", true).await.unwrap();
        assert!(action_enabled(db.pool(), "u1", "followed").await.unwrap());
    }
}
