//! Direct-message conversations.

use std::sync::Arc;

use async_trait::async_trait;
use burrow_database::{conversation, user, Conversation, Database, Message};
use serde_json::json;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::notify::{NotifyAction, Notifier};
use crate::pagination::{paginate, Page, Pager};
use crate::realtime::Realtime;

/// Paired-participant messaging.
#[derive(Clone)]
pub struct ConversationService {
    db: Database,
    notifier: Notifier,
    realtime: Arc<dyn Realtime>,
}

impl ConversationService {
    pub fn new(db: Database, notifier: Notifier, realtime: Arc<dyn Realtime>) -> Self {
        Self {
            db,
            notifier,
            realtime,
        }
    }

    /// Open (or return the existing) conversation with another user.
    ///
    /// Each participant binds an exchange key so message keys can be
    /// transported between them.
    pub async fn open_conversation(
        &self,
        initiator_id: &str,
        peer_id: &str,
        initiator_key_id: Option<i64>,
        peer_key_id: Option<i64>,
    ) -> Result<Conversation> {
        if user::get_user(self.db.pool(), peer_id).await?.is_none() {
            return Err(EngineError::NotFound { entity: "User" });
        }

        if let Some(existing) =
            conversation::find_conversation(self.db.pool(), initiator_id, peer_id).await?
        {
            return Ok(existing);
        }

        let created = conversation::create_conversation(
            self.db.pool(),
            initiator_id,
            initiator_key_id,
            peer_id,
            peer_key_id,
        )
        .await?;
        info!(conversation_id = created.id, "opened conversation");
        Ok(created)
    }

    /// Append a message and push it to the other participant.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        sender_id: &str,
        body: &str,
    ) -> Result<Message> {
        let conversation = conversation::get_conversation(self.db.pool(), conversation_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "Conversation" })?;

        let peer_id = if conversation.user_a_id == sender_id {
            conversation.user_b_id.as_str()
        } else if conversation.user_b_id == sender_id {
            conversation.user_a_id.as_str()
        } else {
            return Err(EngineError::Unauthorized);
        };

        let message =
            conversation::insert_message(self.db.pool(), conversation_id, sender_id, body).await?;

        let event = json!({
            "type": "message",
            "conversation_id": conversation_id,
            "message_id": message.id,
            "sender_id": sender_id,
        })
        .to_string();
        self.realtime.send(peer_id, &event).await;
        self.notifier
            .notify(
                peer_id,
                NotifyAction::Message,
                "sent you a message",
                json!({ "conversation_id": conversation_id, "sender_id": sender_id }),
            )
            .await?;

        Ok(message)
    }

    /// Page a user's conversations, newest first.
    pub async fn page_conversations(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<Conversation>> {
        let pager = ConversationPager {
            db: self.db.clone(),
            user_id: user_id.to_string(),
        };
        paginate(&pager, cursor, limit).await
    }

    /// Page a conversation's messages, newest first. The reader must be a
    /// participant.
    pub async fn page_messages(
        &self,
        user_id: &str,
        conversation_id: i64,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<Message>> {
        let conversation = conversation::get_conversation(self.db.pool(), conversation_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "Conversation" })?;
        if conversation.user_a_id != user_id && conversation.user_b_id != user_id {
            return Err(EngineError::Unauthorized);
        }

        let pager = MessagePager {
            db: self.db.clone(),
            conversation_id,
        };
        paginate(&pager, cursor, limit).await
    }
}

struct ConversationPager {
    db: Database,
    user_id: String,
}

#[async_trait]
impl Pager for ConversationPager {
    type Item = Conversation;

    async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<Conversation>> {
        Ok(conversation::page_conversations(self.db.pool(), &self.user_id, before, limit).await?)
    }

    async fn total(&self) -> Result<i64> {
        Ok(conversation::count_conversations(self.db.pool(), &self.user_id).await?)
    }

    async fn exists_older(&self, before: i64) -> Result<bool> {
        Ok(conversation::conversations_exist_older(self.db.pool(), &self.user_id, before).await?)
    }

    fn created_at(item: &Conversation) -> i64 {
        item.created_at
    }
}

struct MessagePager {
    db: Database,
    conversation_id: i64,
}

#[async_trait]
impl Pager for MessagePager {
    type Item = Message;

    async fn page(&self, before: Option<i64>, limit: i64) -> Result<Vec<Message>> {
        Ok(conversation::page_messages(self.db.pool(), self.conversation_id, before, limit).await?)
    }

    async fn total(&self) -> Result<i64> {
        Ok(conversation::count_messages(self.db.pool(), self.conversation_id).await?)
    }

    async fn exists_older(&self, before: i64) -> Result<bool> {
        Ok(
            conversation::messages_exist_older(self.db.pool(), self.conversation_id, before)
                .await?,
        )
    }

    fn created_at(item: &Message) -> i64 {
        item.created_at
    }
}
