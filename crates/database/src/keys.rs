//! Symmetric and key-exchange key storage.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{UserEcdhKey, UserSymKey};
use crate::now_millis;

/// Store opaque symmetric key material and return its ID.
pub async fn create_sym_key(pool: &SqlitePool, material: &str) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO user_sym_keys (material)
        VALUES (?)
        RETURNING id
        "#,
    )
    .bind(material)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Batch-fetch symmetric keys. Missing ids are simply absent from the result.
pub async fn get_sym_keys(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<UserSymKey>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT id, material
        FROM user_sym_keys
        WHERE id IN ({placeholders})
        "#,
    );

    let mut q = sqlx::query_as::<_, UserSymKey>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Delete a symmetric key. Returns true iff exactly one row was removed.
pub async fn delete_sym_key(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_sym_keys
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Count a user's exchange keys.
pub async fn count_ecdh_keys(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM user_ecdh_keys WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Insert an exchange key pair for a user. The capacity limit is enforced by
/// the caller before insertion.
pub async fn create_ecdh_key(
    pool: &SqlitePool,
    user_id: &str,
    public_key: &str,
    private_key: &str,
) -> Result<UserEcdhKey> {
    let created_at = now_millis();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO user_ecdh_keys (user_id, public_key, private_key, claimed, created_at)
        VALUES (?, ?, ?, 0, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(public_key)
    .bind(private_key)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(UserEcdhKey {
        id,
        user_id: user_id.to_string(),
        public_key: public_key.to_string(),
        private_key: private_key.to_string(),
        claimed: false,
        created_at,
    })
}

/// List a user's exchange keys, optionally filtered by claimed state.
pub async fn list_ecdh_keys(
    pool: &SqlitePool,
    user_id: &str,
    claimed: Option<bool>,
) -> Result<Vec<UserEcdhKey>> {
    let keys = match claimed {
        None => {
            sqlx::query_as::<_, UserEcdhKey>(
                r#"
                SELECT id, user_id, public_key, private_key, claimed, created_at
                FROM user_ecdh_keys
                WHERE user_id = ?
                ORDER BY created_at
                "#,
            )
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
        Some(claimed) => {
            sqlx::query_as::<_, UserEcdhKey>(
                r#"
                SELECT id, user_id, public_key, private_key, claimed, created_at
                FROM user_ecdh_keys
                WHERE user_id = ? AND claimed = ?
                ORDER BY created_at
                "#,
            )
            .bind(user_id)
            .bind(claimed)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(keys)
}

/// Batch-fetch exchange keys by ID. Missing ids are simply absent.
pub async fn get_ecdh_keys(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<UserEcdhKey>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT id, user_id, public_key, private_key, claimed, created_at
        FROM user_ecdh_keys
        WHERE id IN ({placeholders})
        "#,
    );

    let mut q = sqlx::query_as::<_, UserEcdhKey>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Mark exchange keys claimed. Only currently-unclaimed keys are touched;
/// unknown ids are ignored. Returns the number of keys claimed.
pub async fn claim_ecdh_keys(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        r#"
        UPDATE user_ecdh_keys
        SET claimed = 1
        WHERE claimed = 0 AND id IN ({placeholders})
        "#,
    );

    let mut q = sqlx::query(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.execute(pool).await?.rows_affected())
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
    async fn test_sym_key_lifecycle() {
        let db = test_db().await;

        let id = create_sym_key(db.pool(), "material").await.unwrap();
        let keys = get_sym_keys(db.pool(), &[id, 9999]).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].material, "material");

        assert!(delete_sym_key(db.pool(), id).await.unwrap());
        assert!(!delete_sym_key(db.pool(), id).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_only_unclaimed() {
        let db = test_db().await;

        let k1 = create_ecdh_key(db.pool(), "u1", "pub1", "priv1").await.unwrap();
        let k2 = create_ecdh_key(db.pool(), "u1", "pub2", "priv2").await.unwrap();

        assert_eq!(claim_ecdh_keys(db.pool(), &[k1.id]).await.unwrap(), 1);
        // k1 already claimed, 9999 unknown: only k2 transitions.
        assert_eq!(
            claim_ecdh_keys(db.pool(), &[k1.id, k2.id, 9999]).await.unwrap(),
            1
        );

        let unclaimed = list_ecdh_keys(db.pool(), "u1", Some(false)).await.unwrap();
        assert!(unclaimed.is_empty());
        let all = list_ecdh_keys(db.pool(), "u1", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
