//! Access-group storage.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::GroupPolicy;

/// Create a group for a user.
///
/// Inserting a new default clears any prior default for the same owner, so
/// at most one default exists per owner.
pub async fn create_group(
    pool: &SqlitePool,
    owner_id: &str,
    sym_key_id: i64,
    name: &str,
    is_default: bool,
) -> Result<GroupPolicy> {
    let mut tx = pool.begin().await?;

    if is_default {
        sqlx::query(
            r#"
            UPDATE group_policies
            SET is_default = 0
            WHERE owner_id = ? AND is_default = 1
            "#,
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO group_policies (owner_id, sym_key_id, name, is_default)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(owner_id)
    .bind(sym_key_id)
    .bind(name)
    .bind(is_default)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(GroupPolicy {
        id,
        owner_id: owner_id.to_string(),
        sym_key_id,
        name: name.to_string(),
        is_default,
    })
}

/// Get a group by ID, but only if it belongs to the given owner.
pub async fn get_group_owned(
    pool: &SqlitePool,
    group_id: i64,
    owner_id: &str,
) -> Result<Option<GroupPolicy>> {
    let group = sqlx::query_as::<_, GroupPolicy>(
        r#"
        SELECT id, owner_id, sym_key_id, name, is_default
        FROM group_policies
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(group_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(group)
}

/// Get a user's default group, if one exists.
pub async fn default_group(pool: &SqlitePool, owner_id: &str) -> Result<Option<GroupPolicy>> {
    let group = sqlx::query_as::<_, GroupPolicy>(
        r#"
        SELECT id, owner_id, sym_key_id, name, is_default
        FROM group_policies
        WHERE owner_id = ? AND is_default = 1
        "#,
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(group)
}

/// List all groups a user owns.
pub async fn list_groups(pool: &SqlitePool, owner_id: &str) -> Result<Vec<GroupPolicy>> {
    let groups = sqlx::query_as::<_, GroupPolicy>(
        r#"
        SELECT id, owner_id, sym_key_id, name, is_default
        FROM group_policies
        WHERE owner_id = ?
        ORDER BY id
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(groups)
}

/// Delete a group and its symmetric key.
///
/// Returns true if the group existed. Follow state referencing the group is
/// left in place; group deletion is independent of follow lifecycle.
pub async fn delete_group(pool: &SqlitePool, group_id: i64, owner_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let sym_key_id = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT sym_key_id
        FROM group_policies
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(group_id)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(sym_key_id) = sym_key_id else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM group_policies WHERE id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_sym_keys WHERE id = ?")
        .bind(sym_key_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}
