use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;
use crate::error::{Result, SwitchboardError};

/// Reachability and capability record for one specialist. Built from static
/// configuration at startup; immutable during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub base_url: String,
    pub capabilities: Vec<String>,
}

impl AgentDescriptor {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        capabilities: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Ordered set of known specialists. A Vec backing keeps iteration in
/// registration order, which is the keyword-routing tie-break.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the demo deployment: math + text specialists at their
    /// configured URLs, in that order.
    pub fn from_system_config(system: &SystemConfig) -> Result<Self> {
        use crate::agents::{MathAgent, TextAgent};

        let mut registry = Self::new();
        registry.register(AgentDescriptor::new(
            MathAgent::NAME,
            system.math_agent_url.clone(),
            MathAgent::CAPABILITIES,
        ))?;
        registry.register(AgentDescriptor::new(
            TextAgent::NAME,
            system.text_agent_url.clone(),
            TextAgent::CAPABILITIES,
        ))?;
        Ok(registry)
    }

    /// Adds an agent, or replaces it when re-registered with the same
    /// address. A colliding name with a different address is a conflict.
    pub fn register(&mut self, descriptor: AgentDescriptor) -> Result<()> {
        if let Some(existing) = self.agents.iter_mut().find(|a| a.name == descriptor.name) {
            if existing.base_url != descriptor.base_url {
                return Err(SwitchboardError::DuplicateNameConflict {
                    name: descriptor.name,
                    existing: existing.base_url.clone(),
                    offered: descriptor.base_url,
                });
            }
            *existing = descriptor;
            return Ok(());
        }
        self.agents.push(descriptor);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&AgentDescriptor> {
        self.agents
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SwitchboardError::UnknownAgent {
                name: name.to_string(),
            })
    }

    /// Registration-order iteration.
    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math() -> AgentDescriptor {
        AgentDescriptor::new("math_agent", "http://localhost:2025", &["math", "add"])
    }

    #[test]
    fn resolve_after_register_returns_same_descriptor() {
        let mut registry = AgentRegistry::new();
        registry.register(math()).unwrap();
        assert_eq!(registry.resolve("math_agent").unwrap(), &math());
    }

    #[test]
    fn unregistered_name_is_unknown_agent() {
        let registry = AgentRegistry::new();
        let err = registry.resolve("geo_agent").unwrap_err();
        assert!(matches!(err, SwitchboardError::UnknownAgent { name } if name == "geo_agent"));
    }

    #[test]
    fn same_name_same_address_replaces() {
        let mut registry = AgentRegistry::new();
        registry.register(math()).unwrap();
        let updated =
            AgentDescriptor::new("math_agent", "http://localhost:2025", &["math", "sqrt"]);
        registry.register(updated.clone()).unwrap();
        assert_eq!(registry.resolve("math_agent").unwrap(), &updated);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_name_different_address_conflicts() {
        let mut registry = AgentRegistry::new();
        registry.register(math()).unwrap();
        let err = registry
            .register(AgentDescriptor::new(
                "math_agent",
                "http://localhost:9999",
                &["math"],
            ))
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::DuplicateNameConflict { .. }));
    }

    #[test]
    fn iteration_preserves_registration_order() {
        let mut registry = AgentRegistry::new();
        registry.register(math()).unwrap();
        registry
            .register(AgentDescriptor::new(
                "text_agent",
                "http://localhost:2026",
                &["text"],
            ))
            .unwrap();
        let names: Vec<&str> = registry.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["math_agent", "text_agent"]);
    }
}
