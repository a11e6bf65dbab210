//! Follow request and approval storage.
//!
//! A follow is one row per (requester, followee) pair, created unapproved and
//! mutated exactly once on approval. The approval is a conditional update
//! guarded by `(followee_id, id, is_approved = 0)`; callers treat anything
//! other than exactly one affected row as a failed approval.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::GroupFollowApproval;
use crate::now_millis;

const FOLLOW_COLUMNS: &str = "id, requester_id, followee_id, encrypted_sym_key, \
     requester_key_id, followee_key_id, group_id, is_approved, created_at";

/// Insert a new unapproved follow request.
///
/// Fails with `AlreadyExists` if a row for the pair already exists,
/// regardless of its approval state.
pub async fn create_follow(
    pool: &SqlitePool,
    requester_id: &str,
    followee_id: &str,
    requester_key_id: Option<i64>,
) -> Result<GroupFollowApproval> {
    let created_at = now_millis();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO follow_approvals (requester_id, followee_id, requester_key_id, is_approved, created_at)
        VALUES (?, ?, ?, 0, ?)
        RETURNING id
        "#,
    )
    .bind(requester_id)
    .bind(followee_id)
    .bind(requester_key_id)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        DatabaseError::from_unique_violation(e, "Follow", format!("{requester_id}/{followee_id}"))
    })?;

    Ok(GroupFollowApproval {
        id,
        requester_id: requester_id.to_string(),
        followee_id: followee_id.to_string(),
        encrypted_sym_key: None,
        requester_key_id,
        followee_key_id: None,
        group_id: None,
        is_approved: false,
        created_at,
    })
}

/// Get the follow row for a (requester, followee) pair.
pub async fn get_follow(
    pool: &SqlitePool,
    requester_id: &str,
    followee_id: &str,
) -> Result<Option<GroupFollowApproval>> {
    let query = format!(
        "SELECT {FOLLOW_COLUMNS} FROM follow_approvals WHERE requester_id = ? AND followee_id = ?"
    );

    let follow = sqlx::query_as::<_, GroupFollowApproval>(&query)
        .bind(requester_id)
        .bind(followee_id)
        .fetch_optional(pool)
        .await?;

    Ok(follow)
}

/// Get a follow row by ID.
pub async fn get_follow_by_id(pool: &SqlitePool, id: i64) -> Result<Option<GroupFollowApproval>> {
    let query = format!("SELECT {FOLLOW_COLUMNS} FROM follow_approvals WHERE id = ?");

    let follow = sqlx::query_as::<_, GroupFollowApproval>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(follow)
}

/// Conditionally approve a follow row.
///
/// The update only matches an unapproved row with the given id belonging to
/// the given followee; the pair uniqueness constraint plus the primary key
/// guarantee at most one row can match. Returns true iff exactly one row was
/// updated.
pub async fn approve_follow(
    pool: &SqlitePool,
    followee_id: &str,
    follow_id: i64,
    group_id: i64,
    followee_key_id: i64,
    encrypted_sym_key: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE follow_approvals
        SET is_approved = 1, group_id = ?, followee_key_id = ?, encrypted_sym_key = ?
        WHERE followee_id = ? AND id = ? AND is_approved = 0
        "#,
    )
    .bind(group_id)
    .bind(followee_key_id)
    .bind(encrypted_sym_key)
    .bind(followee_id)
    .bind(follow_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// IDs of all users with an approved follow naming `followee_id` as followee.
pub async fn approved_follower_ids(pool: &SqlitePool, followee_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT requester_id
        FROM follow_approvals
        WHERE followee_id = ? AND is_approved = 1
        "#,
    )
    .bind(followee_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// IDs of all users `requester_id` has an approved follow on.
pub async fn approved_followee_ids(pool: &SqlitePool, requester_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT followee_id
        FROM follow_approvals
        WHERE requester_id = ? AND is_approved = 1
        "#,
    )
    .bind(requester_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Encrypted group keys the requester has been approved to hold, for the
/// given group ids. Groups the requester has no approval for are absent.
pub async fn approved_group_keys(
    pool: &SqlitePool,
    requester_id: &str,
    group_ids: &[i64],
) -> Result<Vec<(i64, String)>> {
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; group_ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT group_id, encrypted_sym_key
        FROM follow_approvals
        WHERE requester_id = ? AND is_approved = 1
          AND encrypted_sym_key IS NOT NULL
          AND group_id IN ({placeholders})
        "#,
    );

    let mut q = sqlx::query_as::<_, (i64, String)>(&query);
    q = q.bind(requester_id);
    for id in group_ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Which side of the follow relation a listing filters on.
///
/// Column predicates are fixed strings selected through this enum; SQLite
/// cannot parameterize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowFilter {
    /// Approved rows where the user is the followee.
    Followers,
    /// Approved rows where the user is the requester.
    Followees,
    /// Unapproved rows awaiting the user's approval.
    PendingApprovals,
}

impl FollowFilter {
    fn predicate(&self) -> &'static str {
        match self {
            FollowFilter::Followers => "followee_id = ? AND is_approved = 1",
            FollowFilter::Followees => "requester_id = ? AND is_approved = 1",
            FollowFilter::PendingApprovals => "followee_id = ? AND is_approved = 0",
        }
    }
}

/// Page follow rows for a user, newest first, strictly older than `before`.
pub async fn page_follows(
    pool: &SqlitePool,
    filter: FollowFilter,
    user_id: &str,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<GroupFollowApproval>> {
    let query = format!(
        "SELECT {FOLLOW_COLUMNS} FROM follow_approvals \
         WHERE {} AND created_at < ? ORDER BY created_at DESC LIMIT ?",
        filter.predicate()
    );

    let rows = sqlx::query_as::<_, GroupFollowApproval>(&query)
        .bind(user_id)
        .bind(before.unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Total follow rows for a user under the filter, ignoring any cursor.
pub async fn count_follows(pool: &SqlitePool, filter: FollowFilter, user_id: &str) -> Result<i64> {
    let query = format!(
        "SELECT COUNT(*) FROM follow_approvals WHERE {}",
        filter.predicate()
    );

    let count = sqlx::query_scalar::<_, i64>(&query)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Whether at least one row strictly older than `before` exists.
pub async fn follows_exist_older(
    pool: &SqlitePool,
    filter: FollowFilter,
    user_id: &str,
    before: i64,
) -> Result<bool> {
    let query = format!(
        "SELECT 1 FROM follow_approvals WHERE {} AND created_at < ? LIMIT 1",
        filter.predicate()
    );

    let row = sqlx::query_scalar::<_, i32>(&query)
        .bind(user_id)
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
    async fn test_one_row_per_pair() {
        let db = test_db().await;

        create_follow(db.pool(), "u1", "u2", Some(1)).await.unwrap();
        let err = create_follow(db.pool(), "u1", "u2", Some(2)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));

        // The reverse direction is a distinct pair.
        create_follow(db.pool(), "u2", "u1", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_approval_is_conditional() {
        let db = test_db().await;

        let follow = create_follow(db.pool(), "u1", "u2", Some(1)).await.unwrap();

        // Wrong followee matches nothing.
        assert!(!approve_follow(db.pool(), "u1", follow.id, 7, 3, "enc").await.unwrap());

        assert!(approve_follow(db.pool(), "u2", follow.id, 7, 3, "enc").await.unwrap());
        // Second approval matches nothing: the row is no longer unapproved.
        assert!(!approve_follow(db.pool(), "u2", follow.id, 7, 3, "enc").await.unwrap());

        let row = get_follow_by_id(db.pool(), follow.id).await.unwrap().unwrap();
        assert!(row.is_approved);
        assert_eq!(row.group_id, Some(7));
        assert_eq!(row.followee_key_id, Some(3));
        assert_eq!(row.encrypted_sym_key.as_deref(), Some("enc"));
    }

    #[tokio::test]
    async fn test_approved_id_lookups() {
        let db = test_db().await;

        let follow = create_follow(db.pool(), "u1", "u2", None).await.unwrap();
        assert!(approved_follower_ids(db.pool(), "u2").await.unwrap().is_empty());

        approve_follow(db.pool(), "u2", follow.id, 7, 3, "enc").await.unwrap();
        assert_eq!(approved_follower_ids(db.pool(), "u2").await.unwrap(), vec!["u1"]);
        assert_eq!(approved_followee_ids(db.pool(), "u1").await.unwrap(), vec!["u2"]);

        let keys = approved_group_keys(db.pool(), "u1", &[7, 8]).await.unwrap();
        assert_eq!(keys, vec![(7, "enc".to_string())]);
    }
}
