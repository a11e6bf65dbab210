//! Real-time delivery to connected clients.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Trait for pushing messages to a user's live connections.
///
/// Owned by the transport layer and injected into the engine; the engine
/// never assumes a connection exists.
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Register a connection for a user, replacing any previous one.
    async fn register(&self, user_id: &str, sender: mpsc::Sender<String>);

    /// Deliver a message to the user's connection, if any.
    ///
    /// Returns true if a connection accepted the message; silently drops
    /// otherwise.
    async fn send(&self, user_id: &str, message: &str) -> bool;

    /// Remove a user's connection on disconnect.
    async fn remove(&self, user_id: &str);
}

/// Concurrency-safe registry mapping user ids to live connection handles.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Realtime for ConnectionRegistry {
    async fn register(&self, user_id: &str, sender: mpsc::Sender<String>) {
        let mut connections = self.connections.write().await;
        connections.insert(user_id.to_string(), sender);
        debug!(user_id = %user_id, "registered realtime connection");
    }

    async fn send(&self, user_id: &str, message: &str) -> bool {
        let sender = {
            let connections = self.connections.read().await;
            connections.get(user_id).cloned()
        };

        match sender {
            Some(sender) => sender.send(message.to_string()).await.is_ok(),
            None => false,
        }
    }

    async fn remove(&self, user_id: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(user_id);
        debug!(user_id = %user_id, "removed realtime connection");
    }
}

/// A no-op registry for tests and offline processing.
#[derive(Debug, Clone, Default)]
pub struct NoOpRealtime;

#[async_trait]
impl Realtime for NoOpRealtime {
    async fn register(&self, _user_id: &str, _sender: mpsc::Sender<String>) {}

    async fn send(&self, _user_id: &str, _message: &str) -> bool {
        false
    }

    async fn remove(&self, _user_id: &str) {}
}
