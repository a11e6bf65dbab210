//! User CRUD operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::User;
use crate::now_millis;

/// Create a new user.
///
/// Fails with `AlreadyExists` if the username or email is taken.
pub async fn create_user(
    pool: &SqlitePool,
    id: &str,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let created_at = now_millis();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(created_at)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_unique_violation(e, "User", username.to_string()))?;

    Ok(User {
        id: id.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        sym_key_id: None,
        first_name: None,
        last_name: None,
        profile_picture: None,
        created_at,
    })
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, sym_key_id,
               first_name, last_name, profile_picture, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Get a user by username.
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, sym_key_id,
               first_name, last_name, profile_picture, created_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Batch-fetch users by ID. Missing ids are simply absent from the result.
pub async fn get_users(pool: &SqlitePool, ids: &[String]) -> Result<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT id, username, email, password_hash, sym_key_id,
               first_name, last_name, profile_picture, created_at
        FROM users
        WHERE id IN ({placeholders})
        "#,
    );

    let mut q = sqlx::query_as::<_, User>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Set the symmetric key protecting a user's profile material.
pub async fn set_user_sym_key(pool: &SqlitePool, id: &str, sym_key_id: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET sym_key_id = ?
        WHERE id = ?
        "#,
    )
    .bind(sym_key_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        });
    }

    Ok(())
}
