use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::thread::ConversationThread;

/// Structured payload for work entering an agent, either straight from the
/// user or as a supervisor-issued sub-task. The thread snapshot carries
/// conversation context by value; agents never see live mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub input: String,
    #[serde(default)]
    pub thread: Option<ConversationThread>,
    #[serde(default)]
    pub configurable: Option<serde_json::Value>,
}

impl AgentRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            thread: None,
            configurable: None,
        }
    }

    pub fn with_thread(mut self, thread: ConversationThread) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_configurable(mut self, configurable: serde_json::Value) -> Self {
        self.configurable = Some(configurable);
        self
    }
}

/// Standardized response wrapper; metadata carries the tool trace and
/// routing detail so callers can audit what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub metadata: Option<serde_json::Value>,
}

impl AgentResponse {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(output: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            output: output.into(),
            metadata: Some(metadata),
        }
    }
}

#[async_trait]
pub trait AgentBehavior: Send + Sync {
    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse>;
}
