//! Settings-gated notifications.

use std::sync::Arc;

use burrow_database::{notification, Database};
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::realtime::Realtime;

/// Actions a notification can be sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Followed,
    Approved,
    Liked,
    Message,
}

impl NotifyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyAction::Followed => "followed",
            NotifyAction::Approved => "approved",
            NotifyAction::Liked => "liked",
            NotifyAction::Message => "message",
        }
    }
}

/// Notification sink gated by per-user, per-action settings.
#[derive(Clone)]
pub struct Notifier {
    db: Database,
    realtime: Arc<dyn Realtime>,
}

impl Notifier {
    pub fn new(db: Database, realtime: Arc<dyn Realtime>) -> Self {
        Self { db, realtime }
    }

    /// Record a notification and push it to the user's live connection.
    ///
    /// The settings lookup happens before anything is written; a disabled
    /// action is a silent no-op.
    pub async fn notify(
        &self,
        user_id: &str,
        action: NotifyAction,
        content: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        if !notification::action_enabled(self.db.pool(), user_id, action.as_str()).await? {
            debug!(user_id = %user_id, action = action.as_str(), "notification disabled, skipping");
            return Ok(());
        }

        let payload_text = payload.to_string();
        notification::insert_notification(
            self.db.pool(),
            user_id,
            action.as_str(),
            content,
            Some(&payload_text),
        )
        .await?;

        let message = json!({
            "type": "notification",
            "action": action.as_str(),
            "content": content,
            "payload": payload,
        })
        .to_string();
        self.realtime.send(user_id, &message).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::NoOpRealtime;
    use burrow_database::user;
    use serde_json::json;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        user::create_user(db.pool(), "u1", "alice", "a@example.com", "hash")
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_notify_respects_settings() {
        let db = test_db().await;
        let notifier = Notifier::new(db.clone(), Arc::new(NoOpRealtime));

        notifier
            .notify("u1", NotifyAction::Followed, "bob followed you", json!({"from": "u2"}))
            .await
            .unwrap();
        let rows = notification::recent_notifications(db.pool(), "u1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "followed");

        notification::set_action_enabled(db.pool(), "u1", "followed", false)
            .await
            .unwrap();
        notifier
            .notify("u1", NotifyAction::Followed, "carol followed you", json!({"from": "u3"}))
            .await
            .unwrap();
        let rows = notification::recent_notifications(db.pool(), "u1", 10).await.unwrap();
        assert_eq!(rows.len(), 1, "disabled action must not record anything");
    }
}
