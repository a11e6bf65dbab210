//! Grant ledger: who may decrypt whose profile material, and with which keys.

use std::collections::HashMap;

use burrow_database::{grant, keys, user, Database, ProfileGrant, User, UserEcdhKey};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// A grant resolved for presentation: the grant row joined with both
/// exchange-key records and the subject's profile.
#[derive(Debug, Clone)]
pub struct GrantedProfile {
    pub subject_id: String,
    pub grant: ProfileGrant,
    /// Grantee's (the reader's) exchange key, if the id still resolves.
    pub grantee_key: Option<UserEcdhKey>,
    /// Subject's exchange key, if the id still resolves.
    pub subject_key: Option<UserEcdhKey>,
    pub profile: Option<User>,
}

/// Grant fields merged into any profile-bearing response.
///
/// Always fully populated or fully `None`; a missing grant produces the
/// all-`None` view so callers can embed it unconditionally.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileGrantView {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
    /// Subject's exchange public key.
    pub public_key: Option<String>,
    /// The reader's own exchange-key id bound into the grant.
    pub own_key_id: Option<i64>,
    /// The reader's own (encrypted) private key half.
    pub own_private_key: Option<String>,
    /// Subject's profile symmetric key, encrypted for the reader.
    pub encrypted_profile_sym_key: Option<String>,
}

impl ProfileGrantView {
    /// Build the view from a resolved grant, or the all-`None` view from
    /// nothing.
    pub fn from_granted(granted: Option<&GrantedProfile>) -> Self {
        let Some(granted) = granted else {
            return Self::default();
        };

        Self {
            first_name: granted.profile.as_ref().and_then(|p| p.first_name.clone()),
            last_name: granted.profile.as_ref().and_then(|p| p.last_name.clone()),
            profile_picture: granted
                .profile
                .as_ref()
                .and_then(|p| p.profile_picture.clone()),
            public_key: granted.subject_key.as_ref().map(|k| k.public_key.clone()),
            own_key_id: granted.grantee_key.as_ref().map(|k| k.id),
            own_private_key: granted.grantee_key.as_ref().map(|k| k.private_key.clone()),
            encrypted_profile_sym_key: granted.grant.encrypted_sym_key.clone(),
        }
    }
}

/// Ledger of profile grants.
#[derive(Clone)]
pub struct GrantLedger {
    db: Database,
}

impl GrantLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record that `grantee_id` may decrypt `subject_id`'s profile material.
    ///
    /// Idempotent: an existing grant for the pair is returned unchanged and
    /// its stored keys are never overwritten.
    pub async fn create_grant(
        &self,
        subject_id: &str,
        grantee_id: &str,
        subject_key_id: Option<i64>,
        grantee_key_id: Option<i64>,
        encrypted_sym_key: Option<&str>,
    ) -> Result<ProfileGrant> {
        let grant = grant::create_grant(
            self.db.pool(),
            subject_id,
            grantee_id,
            subject_key_id,
            grantee_key_id,
            encrypted_sym_key,
        )
        .await?;

        debug!(
            subject = %subject_id,
            grantee = %grantee_id,
            grant_id = grant.id,
            "grant resolved"
        );
        Ok(grant)
    }

    /// Get the grant for a (subject, grantee) pair, if any.
    pub async fn get_grant(
        &self,
        subject_id: &str,
        grantee_id: &str,
    ) -> Result<Option<ProfileGrant>> {
        Ok(grant::get_grant(self.db.pool(), subject_id, grantee_id).await?)
    }

    /// Mark exchange keys claimed.
    ///
    /// Only currently-unclaimed keys transition; `None` entries and unknown
    /// ids are ignored. Side-effect only.
    pub async fn claim_exchange_keys(&self, ids: &[Option<i64>]) -> Result<()> {
        let ids: Vec<i64> = ids.iter().flatten().copied().collect();
        let claimed = keys::claim_ecdh_keys(self.db.pool(), &ids).await?;
        debug!(requested = ids.len(), claimed, "claimed exchange keys");
        Ok(())
    }

    /// Store an encrypted profile key on a grant that has none yet.
    pub async fn store_encrypted_key(&self, grant_id: i64, encrypted_sym_key: &str) -> Result<()> {
        grant::set_encrypted_key_if_absent(self.db.pool(), grant_id, encrypted_sym_key).await?;
        Ok(())
    }

    /// Resolve grants held by `own_id` over the given subjects, joined with
    /// both exchange keys and the subject profiles.
    ///
    /// Subjects without a grant are silently omitted; the caller fills
    /// defaults via [`ProfileGrantView::from_granted`].
    pub async fn profiles_with_grants(
        &self,
        own_id: &str,
        subject_ids: &[String],
    ) -> Result<Vec<GrantedProfile>> {
        let grants = grant::grants_for_subjects(self.db.pool(), own_id, subject_ids).await?;
        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let key_ids: Vec<i64> = grants
            .iter()
            .flat_map(|g| [g.subject_key_id, g.grantee_key_id])
            .flatten()
            .collect();
        let subject_ids: Vec<String> = grants.iter().map(|g| g.subject_id.clone()).collect();

        let key_rows = keys::get_ecdh_keys(self.db.pool(), &key_ids).await?;
        let users = user::get_users(self.db.pool(), &subject_ids).await?;

        let keys_by_id: HashMap<i64, UserEcdhKey> =
            key_rows.into_iter().map(|k| (k.id, k)).collect();
        let users_by_id: HashMap<String, User> =
            users.into_iter().map(|u| (u.id.clone(), u)).collect();

        Ok(grants
            .into_iter()
            .map(|grant| GrantedProfile {
                subject_id: grant.subject_id.clone(),
                grantee_key: grant
                    .grantee_key_id
                    .and_then(|id| keys_by_id.get(&id).cloned()),
                subject_key: grant
                    .subject_key_id
                    .and_then(|id| keys_by_id.get(&id).cloned()),
                profile: users_by_id.get(&grant.subject_id).cloned(),
                grant,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_database::keys as dbkeys;
    use burrow_database::user;

    async fn ledger() -> (GrantLedger, Database) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol")] {
            user::create_user(db.pool(), id, name, &format!("{name}@example.com"), "hash")
                .await
                .unwrap();
        }
        (GrantLedger::new(db.clone()), db)
    }

    #[tokio::test]
    async fn test_create_grant_idempotent_same_id() {
        let (ledger, _db) = ledger().await;

        let first = ledger
            .create_grant("u1", "u2", None, None, Some("enc"))
            .await
            .unwrap();
        let second = ledger
            .create_grant("u1", "u2", Some(1), Some(2), Some("other"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.encrypted_sym_key.as_deref(), Some("enc"));
    }

    #[tokio::test]
    async fn test_claim_ignores_nulls_and_unknown() {
        let (ledger, db) = ledger().await;

        let key = dbkeys::create_ecdh_key(db.pool(), "u1", "pub", "priv").await.unwrap();
        ledger
            .claim_exchange_keys(&[Some(key.id), None, Some(9999)])
            .await
            .unwrap();

        let rows = dbkeys::list_ecdh_keys(db.pool(), "u1", Some(true)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, key.id);
    }

    #[tokio::test]
    async fn test_profiles_with_grants_resolves_both_keys() {
        let (ledger, db) = ledger().await;

        let subject_key = dbkeys::create_ecdh_key(db.pool(), "u1", "subj-pub", "subj-priv")
            .await
            .unwrap();
        let grantee_key = dbkeys::create_ecdh_key(db.pool(), "u2", "me-pub", "me-priv")
            .await
            .unwrap();
        ledger
            .create_grant("u1", "u2", Some(subject_key.id), Some(grantee_key.id), Some("enc"))
            .await
            .unwrap();

        // u3 has no grant and is silently omitted.
        let granted = ledger
            .profiles_with_grants("u2", &["u1".into(), "u3".into()])
            .await
            .unwrap();
        assert_eq!(granted.len(), 1);

        let view = ProfileGrantView::from_granted(Some(&granted[0]));
        assert_eq!(view.public_key.as_deref(), Some("subj-pub"));
        assert_eq!(view.own_key_id, Some(grantee_key.id));
        assert_eq!(view.own_private_key.as_deref(), Some("me-priv"));
        assert_eq!(view.encrypted_profile_sym_key.as_deref(), Some("enc"));
    }

    #[tokio::test]
    async fn test_view_is_all_none_without_grant() {
        let view = ProfileGrantView::from_granted(None);
        assert!(view.first_name.is_none());
        assert!(view.public_key.is_none());
        assert!(view.own_key_id.is_none());
        assert!(view.encrypted_profile_sym_key.is_none());
    }
}
