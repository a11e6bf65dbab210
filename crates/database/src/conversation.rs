//! Conversation and message storage.
//!
//! A conversation pairs two participants; the pair is normalized to
//! lexicographic order before storage so the uniqueness constraint holds
//! regardless of which participant opened the thread.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{Conversation, Message};
use crate::now_millis;

const CONVERSATION_COLUMNS: &str =
    "id, user_a_id, user_b_id, user_a_key_id, user_b_key_id, created_at";

fn normalize<'a>(
    first: &'a str,
    first_key: Option<i64>,
    second: &'a str,
    second_key: Option<i64>,
) -> (&'a str, Option<i64>, &'a str, Option<i64>) {
    if first <= second {
        (first, first_key, second, second_key)
    } else {
        (second, second_key, first, first_key)
    }
}

/// Create a conversation between two users.
pub async fn create_conversation(
    pool: &SqlitePool,
    initiator_id: &str,
    initiator_key_id: Option<i64>,
    peer_id: &str,
    peer_key_id: Option<i64>,
) -> Result<Conversation> {
    let (a, a_key, b, b_key) = normalize(initiator_id, initiator_key_id, peer_id, peer_key_id);
    let created_at = now_millis();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO conversations (user_a_id, user_b_id, user_a_key_id, user_b_key_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(a)
    .bind(b)
    .bind(a_key)
    .bind(b_key)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(Conversation {
        id,
        user_a_id: a.to_string(),
        user_b_id: b.to_string(),
        user_a_key_id: a_key,
        user_b_key_id: b_key,
        created_at,
    })
}

/// Find the conversation between two users, in either participant order.
pub async fn find_conversation(
    pool: &SqlitePool,
    first: &str,
    second: &str,
) -> Result<Option<Conversation>> {
    let (a, _, b, _) = normalize(first, None, second, None);
    let query = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_a_id = ? AND user_b_id = ?"
    );

    let conversation = sqlx::query_as::<_, Conversation>(&query)
        .bind(a)
        .bind(b)
        .fetch_optional(pool)
        .await?;

    Ok(conversation)
}

/// Get a conversation by ID.
pub async fn get_conversation(pool: &SqlitePool, id: i64) -> Result<Option<Conversation>> {
    let query = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");

    let conversation = sqlx::query_as::<_, Conversation>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(conversation)
}

/// Page a user's conversations, newest first, strictly older than `before`.
pub async fn page_conversations(
    pool: &SqlitePool,
    user_id: &str,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<Conversation>> {
    let query = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations \
         WHERE (user_a_id = ? OR user_b_id = ?) AND created_at < ? \
         ORDER BY created_at DESC LIMIT ?"
    );

    let rows = sqlx::query_as::<_, Conversation>(&query)
        .bind(user_id)
        .bind(user_id)
        .bind(before.unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Total conversations for a user, ignoring any cursor.
pub async fn count_conversations(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM conversations WHERE user_a_id = ? OR user_b_id = ?
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Whether the user has a conversation strictly older than `before`.
pub async fn conversations_exist_older(
    pool: &SqlitePool,
    user_id: &str,
    before: i64,
) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1 FROM conversations
        WHERE (user_a_id = ? OR user_b_id = ?) AND created_at < ?
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(before)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Append a message to a conversation.
pub async fn insert_message(
    pool: &SqlitePool,
    conversation_id: i64,
    sender_id: &str,
    body: &str,
) -> Result<Message> {
    let created_at = now_millis();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO messages (conversation_id, sender_id, body, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(conversation_id)
    .bind(sender_id)
    .bind(body)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(Message {
        id,
        conversation_id,
        sender_id: sender_id.to_string(),
        body: body.to_string(),
        created_at,
    })
}

/// Page a conversation's messages, newest first, strictly older than `before`.
pub async fn page_messages(
    pool: &SqlitePool,
    conversation_id: i64,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<Message>> {
    let rows = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, conversation_id, sender_id, body, created_at
        FROM messages
        WHERE conversation_id = ? AND created_at < ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(conversation_id)
    .bind(before.unwrap_or(i64::MAX))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Total messages in a conversation, ignoring any cursor.
pub async fn count_messages(pool: &SqlitePool, conversation_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM messages WHERE conversation_id = ?
        "#,
    )
    .bind(conversation_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Whether the conversation has a message strictly older than `before`.
pub async fn messages_exist_older(
    pool: &SqlitePool,
    conversation_id: i64,
    before: i64,
) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1 FROM messages WHERE conversation_id = ? AND created_at < ? LIMIT 1
        "#,
    )
    .bind(conversation_id)
    .bind(before)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{user, Database};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        for (id, name) in [("u1", "alice"), ("u2", "bob")] {
            user::create_user(db.pool(), id, name, &format!("{name}@example.com"), "hash")
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_find_is_order_insensitive() {
        let db = test_db().await;

        let created = create_conversation(db.pool(), "u2", Some(5), "u1", Some(6))
            .await
            .unwrap();
        // Normalized: u1 is user_a, and the key ids followed their users.
        assert_eq!(created.user_a_id, "u1");
        assert_eq!(created.user_a_key_id, Some(6));
        assert_eq!(created.user_b_key_id, Some(5));

        let found = find_conversation(db.pool(), "u1", "u2").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        let found = find_conversation(db.pool(), "u2", "u1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_messages_append_only_ordering() {
        let db = test_db().await;

        let conv = create_conversation(db.pool(), "u1", None, "u2", None)
            .await
            .unwrap();
        let m1 = insert_message(db.pool(), conv.id, "u1", "hi").await.unwrap();
        let m2 = insert_message(db.pool(), conv.id, "u2", "hello").await.unwrap();

        let page = page_messages(db.pool(), conv.id, None, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        // Newest first; equal timestamps may tie, so only check membership then.
        if m1.created_at != m2.created_at {
            assert_eq!(page[0].id, m2.id);
        }
        assert_eq!(count_messages(db.pool(), conv.id).await.unwrap(), 2);
    }
}
