use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::RoutingStrategy;
use crate::error::{Result, SwitchboardError};
use crate::llm_client::SharedLlmClient;
use crate::thread::{ConversationThread, ThreadId};

use super::registry::AgentRegistry;

/// One supervisor-issued sub-task. Consumed exactly once by its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub target: String,
    pub subtask: String,
    pub thread_id: ThreadId,
}

/// Outcome of the routing decision: answer directly, or hand the turn to
/// one or more specialists.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Direct(String),
    Delegate(Vec<DelegationRequest>),
}

impl RouteOutcome {
    pub fn delegations(&self) -> &[DelegationRequest] {
        match self {
            Self::Delegate(requests) => requests,
            Self::Direct(_) => &[],
        }
    }
}

/// Decides, per turn, whether to answer directly or which specialists get
/// sub-tasks. The keyword strategy is fully deterministic; the intelligent
/// strategy hands the decision itself to a model call and falls back to
/// keyword matching when the model's reply is unusable.
pub struct Router {
    strategy: RoutingStrategy,
    llm_client: SharedLlmClient,
}

impl Router {
    const DECISION_DIRECTIVE: &'static str = "You are the routing brain of a supervisor agent. \
You can invoke specialist agents by calling tools named delegate_to_<name>. \
Decide which specialists should handle the user request. Respond with JSON only: \
either [{\"target\": \"<agent name>\", \"subtask\": \"<derived sub-task>\"}, ...] \
to delegate, or {\"direct\": \"<answer>\"} to answer yourself. \
Always delegate to the appropriate specialist rather than attempting tasks yourself.";

    pub fn new(strategy: RoutingStrategy, llm_client: SharedLlmClient) -> Self {
        Self {
            strategy,
            llm_client,
        }
    }

    #[instrument(skip_all, fields(strategy = ?self.strategy, input = %user_message))]
    pub async fn route(
        &self,
        registry: &AgentRegistry,
        thread_id: &ThreadId,
        thread: &ConversationThread,
        user_message: &str,
        max_delegations: usize,
    ) -> Result<RouteOutcome> {
        match self.strategy {
            RoutingStrategy::Keyword => {
                self.route_by_keywords(registry, thread_id, user_message, max_delegations)
            }
            RoutingStrategy::Intelligent => {
                self.route_by_model(registry, thread_id, thread, user_message, max_delegations)
                    .await
            }
        }
    }

    /// Deterministic pattern match against each agent's capability tags, in
    /// registration order. Identical input and registry state always
    /// produce the same decision.
    fn route_by_keywords(
        &self,
        registry: &AgentRegistry,
        thread_id: &ThreadId,
        user_message: &str,
        max_delegations: usize,
    ) -> Result<RouteOutcome> {
        let lowered = user_message.to_lowercase();
        let mut delegations = Vec::new();

        for descriptor in registry.iter() {
            if delegations.len() >= max_delegations {
                break;
            }
            let matched = descriptor
                .capabilities
                .iter()
                .any(|tag| lowered.contains(tag.to_lowercase().as_str()));
            if matched {
                debug!(agent = %descriptor.name, "Keyword match");
                delegations.push(DelegationRequest {
                    target: descriptor.name.clone(),
                    subtask: user_message.to_string(),
                    thread_id: thread_id.clone(),
                });
            }
        }

        if delegations.is_empty() {
            return Err(SwitchboardError::NoRouteFound);
        }
        Ok(RouteOutcome::Delegate(delegations))
    }

    /// Delegates the decision itself to a model call presenting the
    /// available delegation tools.
    async fn route_by_model(
        &self,
        registry: &AgentRegistry,
        thread_id: &ThreadId,
        thread: &ConversationThread,
        user_message: &str,
        max_delegations: usize,
    ) -> Result<RouteOutcome> {
        let prompt = self.decision_prompt(registry, thread, user_message);
        let reply = match self.llm_client.complete(&prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(?err, "Routing model call failed; falling back to keywords");
                return self.route_by_keywords(registry, thread_id, user_message, max_delegations);
            }
        };

        match self.parse_decision(registry, thread_id, &reply, max_delegations) {
            Some(outcome) => Ok(outcome),
            None => {
                warn!("Unusable routing reply; falling back to keywords");
                self.route_by_keywords(registry, thread_id, user_message, max_delegations)
            }
        }
    }

    fn decision_prompt(
        &self,
        registry: &AgentRegistry,
        thread: &ConversationThread,
        user_message: &str,
    ) -> String {
        let mut prompt = String::from(Self::DECISION_DIRECTIVE);
        prompt.push_str("\n\nAvailable specialist agents:\n");
        for descriptor in registry.iter() {
            prompt.push_str(&format!(
                "- delegate_to_{}: handles {}\n",
                descriptor.name,
                descriptor.capabilities.join(", ")
            ));
        }
        if !thread.is_empty() {
            prompt.push_str(&format!(
                "\nConversation so far: {} prior message(s).\n",
                thread.len()
            ));
        }
        prompt.push_str("\nUser request:\n");
        prompt.push_str(user_message.trim());
        prompt
    }

    /// Accepts `{"direct": ...}` or an array of delegations. Unknown
    /// targets invalidate the whole reply; the invariant is that every
    /// delegation references a registered agent, never a silent drop.
    fn parse_decision(
        &self,
        registry: &AgentRegistry,
        thread_id: &ThreadId,
        reply: &str,
        max_delegations: usize,
    ) -> Option<RouteOutcome> {
        let trimmed = reply.trim();
        let start = trimmed.find(['[', '{'])?;
        let parsed: Value = serde_json::from_str(&trimmed[start..]).ok()?;

        if let Some(direct) = parsed.get("direct").and_then(Value::as_str) {
            return Some(RouteOutcome::Direct(direct.to_string()));
        }

        let entries = parsed.as_array()?;
        let mut delegations = Vec::new();
        for entry in entries.iter().take(max_delegations) {
            let target = entry.get("target").and_then(Value::as_str)?;
            let subtask = entry.get("subtask").and_then(Value::as_str)?;
            if registry.resolve(target).is_err() {
                warn!(target, "Routing reply names an unregistered agent");
                return None;
            }
            delegations.push(DelegationRequest {
                target: target.to_string(),
                subtask: subtask.to_string(),
                thread_id: thread_id.clone(),
            });
        }

        if delegations.is_empty() {
            None
        } else {
            Some(RouteOutcome::Delegate(delegations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::llm_client::ScriptedLlmClient;
    use crate::orchestrator::registry::AgentDescriptor;
    use crate::thread::new_thread_id;

    fn demo_registry() -> AgentRegistry {
        let system = SystemConfig {
            supervisor_port: 2024,
            math_agent_url: "http://localhost:2025".into(),
            text_agent_url: "http://localhost:2026".into(),
        };
        AgentRegistry::from_system_config(&system).unwrap()
    }

    async fn keyword_route(message: &str) -> Result<RouteOutcome> {
        let router = Router::new(RoutingStrategy::Keyword, ScriptedLlmClient::shared());
        router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                message,
                5,
            )
            .await
    }

    #[tokio::test]
    async fn keyword_routing_is_deterministic() {
        let message = "What is 25 + 17 and convert the result to uppercase text?";
        let first = keyword_route(message).await.unwrap();
        let second = keyword_route(message).await.unwrap();
        let names =
            |o: &RouteOutcome| -> Vec<String> {
                o.delegations().iter().map(|d| d.target.clone()).collect()
            };
        assert_eq!(names(&first), names(&second));
        assert_eq!(names(&first), ["math_agent", "text_agent"]);
    }

    #[tokio::test]
    async fn tie_break_prefers_first_registered() {
        // "count" is a capability of both agents' domains in spirit, but only
        // text_agent lists it; "number" belongs to math_agent. A message
        // hitting both yields registration order: math first.
        let outcome = keyword_route("count the number of words").await.unwrap();
        let targets: Vec<&str> = outcome
            .delegations()
            .iter()
            .map(|d| d.target.as_str())
            .collect();
        assert_eq!(targets.first(), Some(&"math_agent"));
    }

    #[tokio::test]
    async fn no_match_is_no_route_found() {
        let err = keyword_route("tell me about the weather in lisbon")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NoRouteFound));
    }

    #[tokio::test]
    async fn max_delegations_caps_the_fanout() {
        let router = Router::new(RoutingStrategy::Keyword, ScriptedLlmClient::shared());
        let outcome = router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                "add numbers and uppercase text",
                1,
            )
            .await
            .unwrap();
        assert_eq!(outcome.delegations().len(), 1);
    }

    #[tokio::test]
    async fn intelligent_routing_parses_model_json() {
        let scripted = ScriptedLlmClient::with_responses(vec![
            r#"[{"target": "text_agent", "subtask": "uppercase: hi"}]"#.to_string(),
        ]);
        let router = Router::new(
            RoutingStrategy::Intelligent,
            std::sync::Arc::new(scripted),
        );
        let outcome = router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                "please shout hi",
                5,
            )
            .await
            .unwrap();
        let delegations = outcome.delegations();
        assert_eq!(delegations.len(), 1);
        assert_eq!(delegations[0].target, "text_agent");
    }

    #[tokio::test]
    async fn intelligent_routing_accepts_direct_answer() {
        let scripted = ScriptedLlmClient::with_responses(vec![
            r#"{"direct": "I can answer that myself: hello."}"#.to_string(),
        ]);
        let router = Router::new(
            RoutingStrategy::Intelligent,
            std::sync::Arc::new(scripted),
        );
        let outcome = router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                "say hello",
                5,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RouteOutcome::Direct(_)));
    }

    #[tokio::test]
    async fn unknown_target_falls_back_to_keywords() {
        let scripted = ScriptedLlmClient::with_responses(vec![
            r#"[{"target": "geo_agent", "subtask": "whatever"}]"#.to_string(),
        ]);
        let router = Router::new(
            RoutingStrategy::Intelligent,
            std::sync::Arc::new(scripted),
        );
        let outcome = router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                "add 2 and 2",
                5,
            )
            .await
            .unwrap();
        assert_eq!(outcome.delegations()[0].target, "math_agent");
    }

    #[tokio::test]
    async fn garbage_reply_falls_back_to_keywords() {
        let scripted =
            ScriptedLlmClient::with_responses(vec!["sure, delegating now!".to_string()]);
        let router = Router::new(
            RoutingStrategy::Intelligent,
            std::sync::Arc::new(scripted),
        );
        let outcome = router
            .route(
                &demo_registry(),
                &new_thread_id(),
                &ConversationThread::default(),
                "multiply 3 by 3",
                5,
            )
            .await
            .unwrap();
        assert_eq!(outcome.delegations()[0].target, "math_agent");
    }
}
