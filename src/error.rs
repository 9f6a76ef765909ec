use thiserror::Error;

/// Domain failures that are recovered at the turn level: the caller sees a
/// degraded answer, never a process crash.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("no agent registered under '{name}'")]
    UnknownAgent { name: String },

    #[error("agent '{name}' already registered at {existing}, refusing {offered}")]
    DuplicateNameConflict {
        name: String,
        existing: String,
        offered: String,
    },

    #[error("no routing strategy could select a specialist or answer directly")]
    NoRouteFound,

    #[error("specialist '{agent}' did not respond within {waited_ms}ms")]
    DelegationTimeout { agent: String, waited_ms: u64 },

    #[error("tool '{tool}' rejected its input: {reason}")]
    InvalidOperand { tool: String, reason: String },

    #[error("no tool named '{name}' is enabled for this agent")]
    UnknownTool { name: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("remote call to '{agent}' failed: {source}")]
    Transport {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SwitchboardError {
    /// True for failures that still allow siblings in the same turn to
    /// contribute to a composed answer.
    pub fn is_turn_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DelegationTimeout { .. }
                | Self::InvalidOperand { .. }
                | Self::NoRouteFound
                | Self::Transport { .. }
        )
    }
}

/// Configuration rejected at load time, before any run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("field '{field}': value {value} outside [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("malformed configurable payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_turn_recoverable() {
        let err = SwitchboardError::DelegationTimeout {
            agent: "math_agent".into(),
            waited_ms: 500,
        };
        assert!(err.is_turn_recoverable());
    }

    #[test]
    fn duplicate_conflict_is_not() {
        let err = SwitchboardError::DuplicateNameConflict {
            name: "math_agent".into(),
            existing: "http://localhost:2025".into(),
            offered: "http://localhost:9999".into(),
        };
        assert!(!err.is_turn_recoverable());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = SwitchboardError::UnknownAgent {
            name: "geo_agent".into(),
        };
        assert!(err.to_string().contains("geo_agent"));
    }
}
