use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{instrument, warn};

use crate::agents::{AgentRequest, AgentResponse};
use crate::config::CoordinationStyle;
use crate::error::{Result, SwitchboardError};
use crate::thread::ConversationThread;

use super::registry::{AgentDescriptor, AgentRegistry};
use super::router::DelegationRequest;

/// Seam between the supervisor and the wire: production uses the HTTP
/// client in `remote`, tests substitute in-process stubs.
#[async_trait]
pub trait DelegationTransport: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &AgentDescriptor,
        request: AgentRequest,
    ) -> Result<AgentResponse>;
}

pub type SharedTransport = Arc<dyn DelegationTransport>;

/// Result of one delegation, tagged with both orderings the supervisor
/// needs: issuance order for composing the reply, completion order for the
/// audit trail.
#[derive(Debug)]
pub struct DelegationOutcome {
    pub agent: String,
    pub issue_index: usize,
    pub completion_rank: usize,
    pub result: Result<AgentResponse>,
}

/// Runs a turn's delegations against their specialists. Calls are
/// synchronous from the supervisor's view; the turn joins on every
/// outstanding delegation before composing.
pub struct DelegationExecutor {
    transport: SharedTransport,
    timeout: Duration,
}

impl DelegationExecutor {
    pub fn new(transport: SharedTransport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Issues all delegations and waits for every one to resolve or time
    /// out. Parallel styles keep the calls concurrently outstanding;
    /// sequential completes each before issuing the next. A timeout fails
    /// only its own delegation, never the siblings.
    #[instrument(skip_all, fields(delegations = delegations.len(), style = ?style))]
    pub async fn execute(
        &self,
        registry: &AgentRegistry,
        delegations: &[DelegationRequest],
        thread: &ConversationThread,
        style: CoordinationStyle,
    ) -> Vec<DelegationOutcome> {
        match style {
            CoordinationStyle::Sequential => {
                self.execute_sequential(registry, delegations, thread).await
            }
            CoordinationStyle::Collaborative | CoordinationStyle::Parallel => {
                self.execute_concurrent(registry, delegations, thread).await
            }
        }
    }

    async fn execute_concurrent(
        &self,
        registry: &AgentRegistry,
        delegations: &[DelegationRequest],
        thread: &ConversationThread,
    ) -> Vec<DelegationOutcome> {
        let completion_counter = AtomicUsize::new(0);

        let futures = delegations.iter().enumerate().map(|(issue_index, request)| {
            let counter = &completion_counter;
            async move {
                let result = self.run_one(registry, request, thread).await;
                let completion_rank = counter.fetch_add(1, Ordering::SeqCst);
                DelegationOutcome {
                    agent: request.target.clone(),
                    issue_index,
                    completion_rank,
                    result,
                }
            }
        });

        let mut outcomes = join_all(futures).await;
        // Callers read issuance order; completion_rank keeps the audit order.
        outcomes.sort_by_key(|o| o.issue_index);
        outcomes
    }

    async fn execute_sequential(
        &self,
        registry: &AgentRegistry,
        delegations: &[DelegationRequest],
        thread: &ConversationThread,
    ) -> Vec<DelegationOutcome> {
        let mut outcomes = Vec::with_capacity(delegations.len());
        for (issue_index, request) in delegations.iter().enumerate() {
            let result = self.run_one(registry, request, thread).await;
            outcomes.push(DelegationOutcome {
                agent: request.target.clone(),
                issue_index,
                completion_rank: issue_index,
                result,
            });
        }
        outcomes
    }

    async fn run_one(
        &self,
        registry: &AgentRegistry,
        request: &DelegationRequest,
        thread: &ConversationThread,
    ) -> Result<AgentResponse> {
        let descriptor = registry.resolve(&request.target)?;
        let agent_request = AgentRequest::new(request.subtask.clone()).with_thread(thread.clone());

        match tokio::time::timeout(
            self.timeout,
            self.transport.invoke(descriptor, agent_request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(agent = %request.target, "Delegation timed out");
                Err(SwitchboardError::DelegationTimeout {
                    agent: request.target.clone(),
                    waited_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::registry::AgentDescriptor;
    use crate::thread::new_thread_id;

    /// Stub transport: replies with a canned string after a per-agent delay.
    struct SleepyTransport {
        delays_ms: Vec<(&'static str, u64)>,
    }

    #[async_trait]
    impl DelegationTransport for SleepyTransport {
        async fn invoke(
            &self,
            descriptor: &AgentDescriptor,
            request: AgentRequest,
        ) -> Result<AgentResponse> {
            let delay = self
                .delays_ms
                .iter()
                .find(|(name, _)| *name == descriptor.name)
                .map(|(_, ms)| *ms)
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AgentResponse::new(format!(
                "{} handled: {}",
                descriptor.name, request.input
            )))
        }
    }

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(AgentDescriptor::new(
                "fast_agent",
                "http://localhost:2025",
                &["fast"],
            ))
            .unwrap();
        registry
            .register(AgentDescriptor::new(
                "slow_agent",
                "http://localhost:2026",
                &["slow"],
            ))
            .unwrap();
        registry
    }

    fn delegations(thread_id: &str) -> Vec<DelegationRequest> {
        ["fast_agent", "slow_agent"]
            .into_iter()
            .map(|target| DelegationRequest {
                target: target.to_string(),
                subtask: "do the thing".to_string(),
                thread_id: thread_id.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn slow_delegation_times_out_without_aborting_fast_sibling() {
        let transport = Arc::new(SleepyTransport {
            delays_ms: vec![("fast_agent", 5), ("slow_agent", 500)],
        });
        let executor = DelegationExecutor::new(transport, Duration::from_millis(100));
        let thread_id = new_thread_id();

        let outcomes = executor
            .execute(
                &registry(),
                &delegations(&thread_id),
                &ConversationThread::default(),
                CoordinationStyle::Parallel,
            )
            .await;

        assert_eq!(outcomes.len(), 2, "the turn joins on every delegation");
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(SwitchboardError::DelegationTimeout { ref agent, .. }) if agent == "slow_agent"
        ));
    }

    #[tokio::test]
    async fn completion_rank_tracks_finish_order() {
        // Issued slow-first; fast finishes first, so ranks invert issuance.
        let transport = Arc::new(SleepyTransport {
            delays_ms: vec![("fast_agent", 5), ("slow_agent", 80)],
        });
        let executor = DelegationExecutor::new(transport, Duration::from_secs(1));
        let thread_id = new_thread_id();
        let mut requests = delegations(&thread_id);
        requests.reverse();

        let outcomes = executor
            .execute(
                &registry(),
                &requests,
                &ConversationThread::default(),
                CoordinationStyle::Parallel,
            )
            .await;

        let slow = outcomes.iter().find(|o| o.agent == "slow_agent").unwrap();
        let fast = outcomes.iter().find(|o| o.agent == "fast_agent").unwrap();
        assert!(fast.completion_rank < slow.completion_rank);
        assert!(slow.issue_index < fast.issue_index);
    }

    #[tokio::test]
    async fn sequential_style_preserves_issuance_as_completion() {
        let transport = Arc::new(SleepyTransport {
            delays_ms: vec![("fast_agent", 5), ("slow_agent", 10)],
        });
        let executor = DelegationExecutor::new(transport, Duration::from_secs(1));
        let thread_id = new_thread_id();

        let outcomes = executor
            .execute(
                &registry(),
                &delegations(&thread_id),
                &ConversationThread::default(),
                CoordinationStyle::Sequential,
            )
            .await;

        for outcome in &outcomes {
            assert_eq!(outcome.issue_index, outcome.completion_rank);
        }
    }

    #[tokio::test]
    async fn unresolvable_target_fails_its_delegation() {
        let transport = Arc::new(SleepyTransport { delays_ms: vec![] });
        let executor = DelegationExecutor::new(transport, Duration::from_secs(1));
        let requests = vec![DelegationRequest {
            target: "ghost_agent".to_string(),
            subtask: "boo".to_string(),
            thread_id: new_thread_id(),
        }];

        let outcomes = executor
            .execute(
                &registry(),
                &requests,
                &ConversationThread::default(),
                CoordinationStyle::Parallel,
            )
            .await;

        assert!(matches!(
            outcomes[0].result,
            Err(SwitchboardError::UnknownAgent { .. })
        ));
    }
}
