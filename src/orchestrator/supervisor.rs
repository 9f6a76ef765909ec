use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::agents::AgentResponse;
use crate::config::SupervisorConfig;
use crate::error::{Result, SwitchboardError};
use crate::llm_client::SharedLlmClient;
use crate::thread::{SharedThreadStore, ThreadId, ThreadMessage};

use super::executor::{DelegationExecutor, DelegationOutcome, SharedTransport};
use super::registry::AgentRegistry;
use super::router::{RouteOutcome, Router};

/// The coordinating agent: routes each user turn, fans sub-tasks out to
/// specialists, and composes the final reply. Failures inside a turn
/// degrade that turn's answer; they never take the session down.
pub struct Supervisor {
    registry: AgentRegistry,
    llm_client: SharedLlmClient,
    transport: SharedTransport,
    threads: SharedThreadStore,
    defaults: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        registry: AgentRegistry,
        llm_client: SharedLlmClient,
        transport: SharedTransport,
        threads: SharedThreadStore,
        defaults: SupervisorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            llm_client,
            transport,
            threads,
            defaults,
        })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn threads(&self) -> &SharedThreadStore {
        &self.threads
    }

    /// One full user turn: append, route, delegate, join, compose.
    #[instrument(skip_all, fields(thread_id = %thread_id, input = %input))]
    pub async fn handle_turn(
        &self,
        thread_id: &ThreadId,
        input: &str,
        configurable: Option<&Value>,
    ) -> Result<AgentResponse> {
        let cfg = match configurable {
            Some(value) => SupervisorConfig::from_configurable(Some(value))?,
            None => self.defaults.clone(),
        };

        self.threads.ensure(thread_id).await;
        self.threads
            .append(thread_id, ThreadMessage::user(input))
            .await;
        let snapshot = self
            .threads
            .snapshot(thread_id)
            .await
            .unwrap_or_default();

        let router = Router::new(cfg.routing_strategy, self.llm_client.clone());
        let outcome = router
            .route(
                &self.registry,
                thread_id,
                &snapshot,
                input,
                cfg.max_delegations as usize,
            )
            .await;

        let response = match outcome {
            Ok(RouteOutcome::Direct(answer)) => AgentResponse::with_metadata(
                answer,
                json!({ "router": { "decision": "direct" } }),
            ),
            Ok(RouteOutcome::Delegate(delegations)) => {
                info!(count = delegations.len(), "Delegating turn to specialists");
                let executor = DelegationExecutor::new(
                    self.transport.clone(),
                    Duration::from_millis(cfg.delegation_timeout_ms),
                );
                let outcomes = executor
                    .execute(
                        &self.registry,
                        &delegations,
                        &snapshot,
                        cfg.coordination_style,
                    )
                    .await;
                self.record_outcomes(thread_id, &outcomes).await;
                self.compose(&outcomes, &cfg)
            }
            Err(SwitchboardError::NoRouteFound) => {
                warn!("No route found for turn");
                AgentResponse::with_metadata(
                    "I could not match this request to any specialist, and I cannot answer it \
                     directly. Try rephrasing with a math or text task."
                        .to_string(),
                    json!({ "router": { "decision": "no_route" } }),
                )
            }
            Err(err) if err.is_turn_recoverable() => {
                warn!(%err, "Turn degraded by recoverable failure");
                AgentResponse::with_metadata(
                    format!("This turn could not be completed: {err}"),
                    json!({ "router": { "decision": "degraded" } }),
                )
            }
            Err(err) => return Err(err),
        };

        self.threads
            .append(
                thread_id,
                ThreadMessage::assistant(None, response.output.clone()),
            )
            .await;

        Ok(response)
    }

    /// Audit trail: specialist replies land on the thread in completion
    /// order, each tagged with its originating agent.
    async fn record_outcomes(&self, thread_id: &ThreadId, outcomes: &[DelegationOutcome]) {
        let mut by_completion: Vec<&DelegationOutcome> = outcomes.iter().collect();
        by_completion.sort_by_key(|o| o.completion_rank);

        for outcome in by_completion {
            let content = match &outcome.result {
                Ok(response) => response.output.clone(),
                Err(err) => format!("[failed] {err}"),
            };
            self.threads
                .append(thread_id, ThreadMessage::tool(outcome.agent.clone(), content))
                .await;
        }
    }

    /// The final reply reads in issuance order regardless of which
    /// specialist finished first.
    fn compose(&self, outcomes: &[DelegationOutcome], cfg: &SupervisorConfig) -> AgentResponse {
        let mut sections = Vec::with_capacity(outcomes.len());
        let mut failures = 0usize;

        for outcome in outcomes {
            match &outcome.result {
                Ok(response) => {
                    if cfg.provide_context {
                        sections.push(format!("{}:\n{}", outcome.agent, response.output));
                    } else {
                        sections.push(response.output.clone());
                    }
                }
                Err(err) => {
                    failures += 1;
                    sections.push(format!(
                        "{} could not complete its part: {}",
                        outcome.agent, err
                    ));
                }
            }
        }

        let mut output = sections.join("\n\n");
        if failures > 0 && failures < outcomes.len() {
            output.push_str("\n\nSome specialists failed; the answer above is partial.");
        } else if failures == outcomes.len() && !outcomes.is_empty() {
            output.push_str("\n\nEvery delegated specialist failed this turn.");
        }

        let audit = outcomes
            .iter()
            .map(|o| {
                json!({
                    "agent": o.agent,
                    "issue_index": o.issue_index,
                    "completion_rank": o.completion_rank,
                    "status": match &o.result {
                        Ok(_) => "ok".to_string(),
                        Err(err) => err.to_string(),
                    },
                })
            })
            .collect::<Vec<_>>();

        AgentResponse::with_metadata(output, json!({ "delegations": audit }))
    }
}
