//! Error types for engine operations.

use burrow_database::DatabaseError;
use cache_store::CacheError;
use thiserror::Error;

/// Errors that can occur in the feed/follow/grant engine.
///
/// Domain failures (missing rows, state conflicts, limits) resolve locally
/// into one of the typed variants below; unexpected store failures propagate
/// through the `Database`/`Cache` variants and are reported to clients as a
/// generic internal error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced user/group/post/follow/conversation is absent.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// A follow already exists and is approved.
    #[error("already following this user")]
    AlreadyFollowing,

    /// A follow request for the pair is already awaiting approval.
    #[error("follow request already pending approval")]
    PendingApproval,

    /// The follow was already approved.
    #[error("follow already approved")]
    AlreadyApproved,

    /// The post is already liked by this user.
    #[error("post already liked")]
    AlreadyLiked,

    /// The post is not currently liked by this user.
    #[error("post not liked")]
    NotLiked,

    /// A per-user resource limit was hit.
    #[error("{what} limit exceeded ({limit})")]
    CapacityExceeded { what: &'static str, limit: u32 },

    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Unexpected relational-store failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Unexpected cache-store failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl EngineError {
    /// HTTP-style status code for the transport layer.
    pub fn status(&self) -> u16 {
        match self {
            EngineError::NotFound { .. } => 404,
            EngineError::AlreadyFollowing
            | EngineError::PendingApproval
            | EngineError::AlreadyApproved
            | EngineError::AlreadyLiked
            | EngineError::NotLiked => 409,
            EngineError::CapacityExceeded { .. } => 429,
            EngineError::Unauthorized => 401,
            EngineError::Database(_) | EngineError::Cache(_) => 500,
        }
    }

    /// Message safe to return to a client.
    ///
    /// Internal store failures are logged with full detail; the raw message
    /// is only exposed when `dev_mode` is set.
    pub fn client_message(&self, dev_mode: bool) -> String {
        match self {
            EngineError::Database(_) | EngineError::Cache(_) => {
                tracing::error!(error = %self, "internal store failure");
                if dev_mode {
                    self.to_string()
                } else {
                    "internal server error".to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EngineError::NotFound { entity: "User" }.status(), 404);
        assert_eq!(EngineError::AlreadyLiked.status(), 409);
        assert_eq!(EngineError::PendingApproval.status(), 409);
        assert_eq!(
            EngineError::CapacityExceeded { what: "exchange key", limit: 50 }.status(),
            429
        );
        assert_eq!(EngineError::Unauthorized.status(), 401);
    }

    #[test]
    fn test_internal_detail_hidden_in_production() {
        let err = EngineError::Cache(cache_store::CacheError::Backend("boom".into()));
        assert_eq!(err.client_message(false), "internal server error");
        assert!(err.client_message(true).contains("boom"));

        let err = EngineError::AlreadyFollowing;
        assert_eq!(err.client_message(false), "already following this user");
    }
}
