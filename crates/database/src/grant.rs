//! Profile grant storage.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::ProfileGrant;
use crate::now_millis;

const GRANT_COLUMNS: &str = "id, subject_id, grantee_id, subject_key_id, grantee_key_id, \
     encrypted_sym_key, granted, created_at";

/// Create a grant for a (subject, grantee) pair, or return the existing one.
///
/// Idempotent: an existing row is returned unchanged and its stored keys are
/// never overwritten.
pub async fn create_grant(
    pool: &SqlitePool,
    subject_id: &str,
    grantee_id: &str,
    subject_key_id: Option<i64>,
    grantee_key_id: Option<i64>,
    encrypted_sym_key: Option<&str>,
) -> Result<ProfileGrant> {
    sqlx::query(
        r#"
        INSERT INTO profile_grants
            (subject_id, grantee_id, subject_key_id, grantee_key_id, encrypted_sym_key, granted, created_at)
        VALUES (?, ?, ?, ?, ?, 1, ?)
        ON CONFLICT (subject_id, grantee_id) DO NOTHING
        "#,
    )
    .bind(subject_id)
    .bind(grantee_id)
    .bind(subject_key_id)
    .bind(grantee_key_id)
    .bind(encrypted_sym_key)
    .bind(now_millis())
    .execute(pool)
    .await?;

    let query =
        format!("SELECT {GRANT_COLUMNS} FROM profile_grants WHERE subject_id = ? AND grantee_id = ?");

    let grant = sqlx::query_as::<_, ProfileGrant>(&query)
        .bind(subject_id)
        .bind(grantee_id)
        .fetch_one(pool)
        .await?;

    Ok(grant)
}

/// Get the grant for a (subject, grantee) pair.
pub async fn get_grant(
    pool: &SqlitePool,
    subject_id: &str,
    grantee_id: &str,
) -> Result<Option<ProfileGrant>> {
    let query =
        format!("SELECT {GRANT_COLUMNS} FROM profile_grants WHERE subject_id = ? AND grantee_id = ?");

    let grant = sqlx::query_as::<_, ProfileGrant>(&query)
        .bind(subject_id)
        .bind(grantee_id)
        .fetch_optional(pool)
        .await?;

    Ok(grant)
}

/// Grants held by `grantee_id` over any of the given subjects. Subjects
/// without a grant are simply absent.
pub async fn grants_for_subjects(
    pool: &SqlitePool,
    grantee_id: &str,
    subject_ids: &[String],
) -> Result<Vec<ProfileGrant>> {
    if subject_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; subject_ids.len()].join(", ");
    let query = format!(
        "SELECT {GRANT_COLUMNS} FROM profile_grants \
         WHERE grantee_id = ? AND subject_id IN ({placeholders})"
    );

    let mut q = sqlx::query_as::<_, ProfileGrant>(&query);
    q = q.bind(grantee_id);
    for id in subject_ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Store an encrypted symmetric key on a grant that does not have one yet.
/// A grant that already carries a key is left untouched.
pub async fn set_encrypted_key_if_absent(
    pool: &SqlitePool,
    grant_id: i64,
    encrypted_sym_key: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE profile_grants
        SET encrypted_sym_key = ?
        WHERE id = ? AND encrypted_sym_key IS NULL
        "#,
    )
    .bind(encrypted_sym_key)
    .bind(grant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
