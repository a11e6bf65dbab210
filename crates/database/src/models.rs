//! Database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user. Identity fields are immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// UUID assigned at registration.
    pub id: String,
    /// Unique handle.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Credential hash (hashed at a higher layer).
    pub password_hash: String,
    /// Symmetric key protecting the user's own profile material.
    pub sym_key_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
    /// Creation timestamp (epoch milliseconds).
    pub created_at: i64,
}

/// An access group owned by a user. Posts are encrypted under the group's
/// symmetric key; followers approved into the group receive that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GroupPolicy {
    pub id: i64,
    pub owner_id: String,
    /// Symmetric key used to encrypt posts published to this group.
    pub sym_key_id: i64,
    pub name: String,
    /// At most one default group per owner.
    pub is_default: bool,
}

/// A follow request and, once approved, the follower's membership in one of
/// the followee's groups. One row per (requester, followee) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GroupFollowApproval {
    pub id: i64,
    pub requester_id: String,
    pub followee_id: String,
    /// Group symmetric key, encrypted for the requester. Set on approval.
    pub encrypted_sym_key: Option<String>,
    /// Requester's exchange key supplied with the request.
    pub requester_key_id: Option<i64>,
    /// Followee's exchange key. Set on approval.
    pub followee_key_id: Option<i64>,
    /// Group the requester was approved into. Set on approval.
    pub group_id: Option<i64>,
    pub is_approved: bool,
    /// Creation timestamp (epoch milliseconds).
    pub created_at: i64,
}

/// Authorization for `grantee_id` to decrypt `subject_id`'s profile material
/// via the embedded exchange-key pair. One row per (subject, grantee) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProfileGrant {
    pub id: i64,
    pub subject_id: String,
    pub grantee_id: String,
    pub subject_key_id: Option<i64>,
    pub grantee_key_id: Option<i64>,
    /// Subject's profile symmetric key, encrypted for the grantee.
    pub encrypted_sym_key: Option<String>,
    pub granted: bool,
    /// Creation timestamp (epoch milliseconds).
    pub created_at: i64,
}

/// A server-held asymmetric key-exchange pair. Claimed exactly once, when
/// bound into a grant or follow exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserEcdhKey {
    pub id: i64,
    pub user_id: String,
    pub public_key: String,
    /// Private half, encrypted at a higher layer before storage.
    pub private_key: String,
    pub claimed: bool,
    /// Creation timestamp (epoch milliseconds).
    pub created_at: i64,
}

/// Opaque symmetric key material, owned by exactly one user or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserSymKey {
    pub id: i64,
    pub material: String,
}

/// An encrypted post. Content is opaque ciphertext to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Post {
    /// UUID assigned at publish.
    pub id: String,
    pub author_id: String,
    pub group_id: i64,
    /// Symmetric key the content was encrypted under.
    pub key_id: i64,
    pub text: Option<String>,
    pub media: Option<String>,
    pub media_encoding: Option<String>,
    /// Creation timestamp (epoch milliseconds); doubles as the feed score.
    pub created_at: i64,
}

/// A like on a post. Unique per (post, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PostLike {
    pub id: i64,
    pub post_id: String,
    pub user_id: String,
    pub created_at: i64,
}

/// A two-participant message thread with per-participant exchange keys.
/// Participants are stored in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub user_a_id: String,
    pub user_b_id: String,
    pub user_a_key_id: Option<i64>,
    pub user_b_key_id: Option<i64>,
    pub created_at: i64,
}

/// An append-only message within a conversation. Body is opaque ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: String,
    pub body: String,
    pub created_at: i64,
}

/// A delivered notification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserNotification {
    pub id: i64,
    pub user_id: String,
    /// Action that triggered the notification (e.g. "followed", "approved").
    pub action: String,
    pub content: String,
    /// JSON payload for the client, if any.
    pub payload: Option<String>,
    pub created_at: i64,
}

/// Per-user, per-action notification enablement. Absence means enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserSetting {
    pub user_id: String,
    pub action: String,
    pub enabled: bool,
}
