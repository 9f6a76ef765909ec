use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::agents::{AgentRequest, AgentResponse};
use crate::error::{Result, SwitchboardError};
use crate::orchestrator::{AgentDescriptor, DelegationTransport};
use crate::thread::ConversationThread;

/// Wire protocol shared by every agent role: create a run, poll its
/// status, fetch the final output. The thread snapshot travels with the
/// request so a remote specialist sees the same conversation context an
/// in-process one would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ConversationThread>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurable: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCreated {
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusResponse {
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutputResponse {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn transport_error(agent: &str, source: impl Into<anyhow::Error>) -> SwitchboardError {
    SwitchboardError::Transport {
        agent: agent.to_string(),
        source: source.into(),
    }
}

/// HTTP client side of the run protocol. This is the production
/// `DelegationTransport`: the supervisor sees a plain async call while the
/// specialist runs remotely behind create/poll/fetch.
pub struct RemoteAgentClient {
    http: reqwest::Client,
    poll_interval: Duration,
}

impl RemoteAgentClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            poll_interval: Duration::from_millis(200),
        })
    }

    /// Connectivity probe used at startup; failures are reported to the
    /// operator, not retried.
    pub async fn is_healthy(&self, descriptor: &AgentDescriptor) -> bool {
        let url = format!("{}/health", descriptor.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn create_run(
        &self,
        descriptor: &AgentDescriptor,
        request: &CreateRunRequest,
    ) -> Result<RunCreated> {
        let url = format!("{}/runs", descriptor.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error(&descriptor.name, err))?;
        response
            .error_for_status()
            .map_err(|err| transport_error(&descriptor.name, err))?
            .json()
            .await
            .map_err(|err| transport_error(&descriptor.name, err))
    }

    async fn poll_until_done(
        &self,
        descriptor: &AgentDescriptor,
        run_id: &str,
    ) -> Result<RunStatusResponse> {
        let url = format!("{}/runs/{}", descriptor.base_url, run_id);
        loop {
            let status: RunStatusResponse = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|err| transport_error(&descriptor.name, err))?
                .error_for_status()
                .map_err(|err| transport_error(&descriptor.name, err))?
                .json()
                .await
                .map_err(|err| transport_error(&descriptor.name, err))?;

            if status.status.is_terminal() {
                return Ok(status);
            }
            debug!(agent = %descriptor.name, run_id, "Run still in flight");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_output(
        &self,
        descriptor: &AgentDescriptor,
        run_id: &str,
    ) -> Result<RunOutputResponse> {
        let url = format!("{}/runs/{}/output", descriptor.base_url, run_id);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|err| transport_error(&descriptor.name, err))?
            .error_for_status()
            .map_err(|err| transport_error(&descriptor.name, err))?
            .json()
            .await
            .map_err(|err| transport_error(&descriptor.name, err))
    }
}

#[async_trait]
impl DelegationTransport for RemoteAgentClient {
    /// Synchronous from the caller's perspective: suspends until the remote
    /// run resolves. The executor wraps this in its own timeout, which also
    /// cancels the polling loop.
    #[instrument(skip_all, fields(agent = %descriptor.name))]
    async fn invoke(
        &self,
        descriptor: &AgentDescriptor,
        request: AgentRequest,
    ) -> Result<AgentResponse> {
        let created = self
            .create_run(
                descriptor,
                &CreateRunRequest {
                    input: request.input,
                    thread_id: None,
                    thread: request.thread,
                    configurable: request.configurable,
                },
            )
            .await?;

        let status = self.poll_until_done(descriptor, &created.run_id).await?;
        if status.status == RunStatus::Failed {
            return Err(transport_error(
                &descriptor.name,
                anyhow::anyhow!(
                    "remote run failed: {}",
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            ));
        }

        let output = self.fetch_output(descriptor, &created.run_id).await?;
        Ok(AgentResponse {
            output: output.output,
            metadata: output.metadata,
        })
    }
}
