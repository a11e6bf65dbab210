//! Key registry: symmetric keys and per-user exchange-key pairs.

use std::collections::HashMap;

use burrow_database::{keys, Database, UserEcdhKey};

use crate::error::{EngineError, Result};

/// Maximum exchange keys a user may hold at once.
pub const MAX_EXCHANGE_KEYS: u32 = 50;

/// Claimed-state filter for exchange-key listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Claimed,
    Unclaimed,
}

impl KeyFilter {
    fn claimed(&self) -> Option<bool> {
        match self {
            KeyFilter::All => None,
            KeyFilter::Claimed => Some(true),
            KeyFilter::Unclaimed => Some(false),
        }
    }
}

/// Registry for symmetric group/profile keys and key-exchange pairs.
#[derive(Clone)]
pub struct KeyRegistry {
    db: Database,
}

impl KeyRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store symmetric key material and return its ID.
    pub async fn create_sym_key(&self, material: &str) -> Result<i64> {
        Ok(keys::create_sym_key(self.db.pool(), material).await?)
    }

    /// Resolve symmetric keys by ID. Missing ids are simply absent from the
    /// map, never an error.
    pub async fn get_sym_keys(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        let rows = keys::get_sym_keys(self.db.pool(), ids).await?;
        Ok(rows.into_iter().map(|k| (k.id, k.material)).collect())
    }

    /// Delete a symmetric key. True iff exactly one row was removed.
    pub async fn delete_sym_key(&self, id: i64) -> Result<bool> {
        Ok(keys::delete_sym_key(self.db.pool(), id).await?)
    }

    /// Create an exchange-key pair for a user.
    ///
    /// Fails with `CapacityExceeded` when the user already holds
    /// [`MAX_EXCHANGE_KEYS`] keys.
    pub async fn create_exchange_key(
        &self,
        user_id: &str,
        public_key: &str,
        private_key: &str,
    ) -> Result<UserEcdhKey> {
        let count = keys::count_ecdh_keys(self.db.pool(), user_id).await?;
        if count >= MAX_EXCHANGE_KEYS as i64 {
            return Err(EngineError::CapacityExceeded {
                what: "exchange key",
                limit: MAX_EXCHANGE_KEYS,
            });
        }

        Ok(keys::create_ecdh_key(self.db.pool(), user_id, public_key, private_key).await?)
    }

    /// List a user's exchange keys.
    pub async fn list_exchange_keys(
        &self,
        user_id: &str,
        filter: KeyFilter,
    ) -> Result<Vec<UserEcdhKey>> {
        Ok(keys::list_ecdh_keys(self.db.pool(), user_id, filter.claimed()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_database::user;

    async fn registry() -> KeyRegistry {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        user::create_user(db.pool(), "u1", "alice", "a@example.com", "hash")
            .await
            .unwrap();
        KeyRegistry::new(db)
    }

    #[tokio::test]
    async fn test_missing_sym_keys_absent_from_map() {
        let registry = registry().await;

        let id = registry.create_sym_key("material").await.unwrap();
        let map = registry.get_sym_keys(&[id, 9999]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&id], "material");
    }

    #[tokio::test]
    async fn test_exchange_key_capacity() {
        let registry = registry().await;

        for i in 0..MAX_EXCHANGE_KEYS {
            registry
                .create_exchange_key("u1", &format!("pub{i}"), &format!("priv{i}"))
                .await
                .unwrap();
        }

        let err = registry
            .create_exchange_key("u1", "pub-overflow", "priv-overflow")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { limit: 50, .. }));

        let all = registry.list_exchange_keys("u1", KeyFilter::All).await.unwrap();
        assert_eq!(all.len(), MAX_EXCHANGE_KEYS as usize);
        let unclaimed = registry
            .list_exchange_keys("u1", KeyFilter::Unclaimed)
            .await
            .unwrap();
        assert_eq!(unclaimed.len(), MAX_EXCHANGE_KEYS as usize);
        assert!(registry
            .list_exchange_keys("u1", KeyFilter::Claimed)
            .await
            .unwrap()
            .is_empty());
    }
}
