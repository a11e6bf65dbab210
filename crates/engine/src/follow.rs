//! Follow state machine: NONE → PENDING → APPROVED (terminal).
//!
//! A follow request creates the pending row, a grant toward the requester,
//! and opportunistic key claims. Approval is a conditional update (see
//! `database::follow::approve_follow`) followed by feed repopulation and the
//! reciprocal grant work. Partial failure between these steps is not rolled
//! back; grant lookups always re-resolve current key state.

use async_trait::async_trait;
use burrow_database::{follow, group, user, Database, FollowFilter, GroupFollowApproval};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::feed::FeedService;
use crate::grants::GrantLedger;
use crate::notify::{NotifyAction, Notifier};
use crate::pagination::{paginate, Page, Pager};

/// The follow request/approval workflow.
#[derive(Clone)]
pub struct FollowService {
    db: Database,
    grants: GrantLedger,
    feed: FeedService,
    notifier: Notifier,
}

impl FollowService {
    pub fn new(db: Database, grants: GrantLedger, feed: FeedService, notifier: Notifier) -> Self {
        Self {
            db,
            grants,
            feed,
            notifier,
        }
    }

    /// Request to follow another user.
    ///
    /// Creates the pending row, notifies the followee (settings permitting),
    /// records a grant so the requester can receive the followee's profile
    /// material once keys are exchanged, and claims the supplied exchange
    /// keys. When the requester also shares their own profile key
    /// (`encrypted_profile_sym_key` plus the followee's exchange key), a
    /// reverse grant is created in the same call.
    pub async fn request_follow(
        &self,
        requester_id: &str,
        followee_id: &str,
        requester_key_id: i64,
        followee_key_id: Option<i64>,
        encrypted_profile_sym_key: Option<&str>,
    ) -> Result<GroupFollowApproval> {
        if user::get_user(self.db.pool(), followee_id).await?.is_none() {
            return Err(EngineError::NotFound { entity: "User" });
        }

        match follow::get_follow(self.db.pool(), requester_id, followee_id).await? {
            Some(existing) if existing.is_approved => return Err(EngineError::AlreadyFollowing),
            Some(_) => return Err(EngineError::PendingApproval),
            None => {}
        }

        let row = follow::create_follow(
            self.db.pool(),
            requester_id,
            followee_id,
            Some(requester_key_id),
        )
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent request for the same pair.
            burrow_database::DatabaseError::AlreadyExists { .. } => EngineError::PendingApproval,
            other => EngineError::Database(other),
        })?;

        self.notifier
            .notify(
                followee_id,
                NotifyAction::Followed,
                "requested to follow you",
                json!({ "follow_id": row.id, "requester_id": requester_id }),
            )
            .await?;

        self.grants
            .create_grant(
                followee_id,
                requester_id,
                followee_key_id,
                Some(requester_key_id),
                None,
            )
            .await?;

        self.grants
            .claim_exchange_keys(&[Some(requester_key_id), followee_key_id])
            .await?;

        // The requester shared their own profile key: grant the followee
        // visibility in the opposite direction too.
        if let (Some(encrypted), Some(followee_key_id)) =
            (encrypted_profile_sym_key, followee_key_id)
        {
            self.grants
                .create_grant(
                    requester_id,
                    followee_id,
                    Some(requester_key_id),
                    Some(followee_key_id),
                    Some(encrypted),
                )
                .await?;
        }

        info!(requester = %requester_id, followee = %followee_id, "follow requested");
        Ok(row)
    }

    /// Approve a pending follow request, admitting the requester into one of
    /// the followee's groups.
    ///
    /// The update is guarded by `(followee_id, follow_id, unapproved)`;
    /// anything other than exactly one affected row is treated as a failed
    /// approval even when no store error occurred.
    pub async fn approve_follow(
        &self,
        followee_id: &str,
        follow_id: i64,
        group_id: i64,
        own_key_id: i64,
        encrypted_group_sym_key: &str,
        encrypted_profile_sym_key: Option<&str>,
    ) -> Result<GroupFollowApproval> {
        if group::get_group_owned(self.db.pool(), group_id, followee_id)
            .await?
            .is_none()
        {
            return Err(EngineError::NotFound { entity: "Group" });
        }

        let updated = follow::approve_follow(
            self.db.pool(),
            followee_id,
            follow_id,
            group_id,
            own_key_id,
            encrypted_group_sym_key,
        )
        .await?;

        if !updated {
            return match follow::get_follow_by_id(self.db.pool(), follow_id).await? {
                Some(row) if row.followee_id == followee_id && row.is_approved => {
                    Err(EngineError::AlreadyApproved)
                }
                _ => Err(EngineError::NotFound { entity: "Follow" }),
            };
        }

        let row = follow::get_follow_by_id(self.db.pool(), follow_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "Follow" })?;

        // The requester's feed gains the followee's back catalog.
        self.feed.populate(&row.requester_id).await?;

        if let Err(e) = self
            .notifier
            .notify(
                &row.requester_id,
                NotifyAction::Approved,
                "approved your follow request",
                json!({ "follow_id": row.id, "followee_id": followee_id }),
            )
            .await
        {
            warn!(error = %e, "approval notification failed");
        }

        let grant = self
            .grants
            .create_grant(
                followee_id,
                &row.requester_id,
                Some(own_key_id),
                row.requester_key_id,
                None,
            )
            .await?;

        self.grants
            .claim_exchange_keys(&[Some(own_key_id), grant.grantee_key_id])
            .await?;

        if let Some(encrypted) = encrypted_profile_sym_key {
            self.grants.store_encrypted_key(grant.id, encrypted).await?;
        }

        info!(
            requester = %row.requester_id,
            followee = %followee_id,
            group_id,
            "follow approved"
        );
        Ok(row)
    }

    /// Page a user's approved followers, newest first.
    pub async fn page_followers(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<GroupFollowApproval>> {
        let pager = FollowPager {
            db: self.db.clone(),
            filter: FollowFilter::Followers,
            user_id: user_id.to_string(),
        };
        paginate(&pager, cursor, limit).await
    }

    /// Page the users a user follows, newest first.
    pub async fn page_followees(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<GroupFollowApproval>> {
        let pager = FollowPager {
            db: self.db.clone(),
            filter: FollowFilter::Followees,
            user_id: user_id.to_string(),
        };
        paginate(&pager, cursor, limit).await
    }

    /// Page follow requests awaiting the user's approval, newest first.
    pub async fn page_pending_approvals(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<GroupFollowApproval>> {
        let pager = FollowPager {
            db: self.db.clone(),
            filter: FollowFilter::PendingApprovals,
            user_id: user_id.to_string(),
        };
        paginate(&pager, cursor, limit).await
    }
}

struct FollowPager {
    db: Database,
    filter: FollowFilter,
    user_id: String,
}

#[async_trait]
impl Pager for FollowPager {
    type Item = GroupFollowApproval;

    async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<GroupFollowApproval>> {
        Ok(follow::page_follows(self.db.pool(), self.filter, &self.user_id, before, limit).await?)
    }

    async fn total(&self) -> Result<i64> {
        Ok(follow::count_follows(self.db.pool(), self.filter, &self.user_id).await?)
    }

    async fn exists_older(&self, before: i64) -> Result<bool> {
        Ok(follow::follows_exist_older(self.db.pool(), self.filter, &self.user_id, before).await?)
    }

    fn created_at(item: &GroupFollowApproval) -> i64 {
        item.created_at
    }
}
