use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: Role,
    /// Originating agent for delegated replies; None for the user and for
    /// the supervisor's own composition.
    pub agent: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ThreadMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            agent: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(agent: Option<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            agent: Some(agent.into()),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only conversation log. Messages are never mutated in place, so a
/// cloned snapshot is always safe to hand to a delegation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationThread {
    pub messages: Vec<ThreadMessage>,
}

impl ConversationThread {
    pub fn append(&mut self, message: ThreadMessage) {
        self.messages.push(message);
    }

    pub fn last_user_message(&self) -> Option<&ThreadMessage> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role == Role::User)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub type ThreadId = String;

pub fn new_thread_id() -> ThreadId {
    Uuid::new_v4().to_string()
}

/// In-memory thread store shared between the HTTP surface and the
/// supervisor. Threads grow monotonically during a session.
#[derive(Default)]
pub struct ThreadStore {
    threads: RwLock<HashMap<ThreadId, ConversationThread>>,
}

pub type SharedThreadStore = Arc<ThreadStore>;

impl ThreadStore {
    pub fn shared() -> SharedThreadStore {
        Arc::new(Self::default())
    }

    /// Returns the thread for `id`, creating an empty one on first use.
    pub async fn ensure(&self, id: &str) {
        let mut threads = self.threads.write().await;
        threads.entry(id.to_string()).or_default();
    }

    pub async fn append(&self, id: &str, message: ThreadMessage) {
        let mut threads = self.threads.write().await;
        threads.entry(id.to_string()).or_default().append(message);
    }

    /// Immutable snapshot for delegations; never hands out live state.
    pub async fn snapshot(&self, id: &str) -> Option<ConversationThread> {
        let threads = self.threads.read().await;
        threads.get(id).cloned()
    }
}
