use std::env;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Process-level wiring: where each agent listens. Read once at startup,
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub supervisor_port: u16,
    pub math_agent_url: String,
    pub text_agent_url: String,
}

impl SystemConfig {
    const MATH_URL_VARS: [&'static str; 2] = ["MATH_AGENT_URL", "SB_MATH_AGENT_URL"];
    const TEXT_URL_VARS: [&'static str; 2] = ["TEXT_AGENT_URL", "SB_TEXT_AGENT_URL"];
    const SUPERVISOR_PORT_VARS: [&'static str; 2] = ["SUPERVISOR_PORT", "SB_SUPERVISOR_PORT"];

    pub const DEFAULT_SUPERVISOR_PORT: u16 = 2024;
    pub const DEFAULT_MATH_PORT: u16 = 2025;
    pub const DEFAULT_TEXT_PORT: u16 = 2026;

    pub fn from_env() -> Self {
        let supervisor_port = Self::read_env(&Self::SUPERVISOR_PORT_VARS)
            .and_then(|value| value.parse().ok())
            .unwrap_or(Self::DEFAULT_SUPERVISOR_PORT);

        Self {
            supervisor_port,
            math_agent_url: Self::read_env(&Self::MATH_URL_VARS)
                .unwrap_or_else(|| format!("http://localhost:{}", Self::DEFAULT_MATH_PORT)),
            text_agent_url: Self::read_env(&Self::TEXT_URL_VARS)
                .unwrap_or_else(|| format!("http://localhost:{}", Self::DEFAULT_TEXT_PORT)),
        }
    }

    fn read_env(candidates: &[&'static str]) -> Option<String> {
        candidates.iter().find_map(|key| env::var(key).ok())
    }
}

fn check_unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfBounds {
            field,
            value: value as f64,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfBounds {
            field,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(())
}

fn deserialize_onto_defaults<T>(configurable: Option<&Value>) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match configurable {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(T::default()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Keyword,
    Intelligent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStyle {
    Collaborative,
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    pub model: String,
    pub temperature: f32,
    pub routing_strategy: RoutingStrategy,
    pub coordination_style: CoordinationStyle,
    pub max_delegations: u8,
    pub provide_context: bool,
    pub delegation_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            model: "anthropic:claude-3-5-sonnet-latest".to_string(),
            temperature: 0.2,
            routing_strategy: RoutingStrategy::Intelligent,
            coordination_style: CoordinationStyle::Collaborative,
            max_delegations: 5,
            provide_context: true,
            delegation_timeout_ms: 30_000,
        }
    }
}

impl SupervisorConfig {
    pub fn from_configurable(configurable: Option<&Value>) -> Result<Self, ConfigError> {
        let cfg: Self = deserialize_onto_defaults(configurable)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("temperature", self.temperature)?;
        check_range("max_delegations", i64::from(self.max_delegations), 1, 10)?;
        if self.delegation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "delegation_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Detailed,
    Concise,
    Steps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MathConfig {
    pub model: String,
    pub temperature: f32,
    pub precision: u8,
    pub show_work: bool,
    pub output_format: OutputFormat,
    pub enabled_tools: Vec<String>,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            model: "anthropic:claude-3-5-haiku-latest".to_string(),
            temperature: 0.1,
            precision: 3,
            show_work: true,
            output_format: OutputFormat::Detailed,
            enabled_tools: ["add", "multiply", "sqrt", "power", "factorial"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MathConfig {
    pub fn from_configurable(configurable: Option<&Value>) -> Result<Self, ConfigError> {
        let cfg: Self = deserialize_onto_defaults(configurable)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("temperature", self.temperature)?;
        check_range("precision", i64::from(self.precision), 0, 10)?;
        if self.enabled_tools.is_empty() {
            return Err(ConfigError::Invalid {
                field: "enabled_tools",
                reason: "at least one tool must be enabled".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Helpful,
    Efficient,
    Educational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_len: u32,
    pub preserve_formatting: bool,
    pub processing_mode: ProcessingMode,
    pub enabled_tools: Vec<String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            model: "anthropic:claude-3-5-haiku-latest".to_string(),
            temperature: 0.3,
            max_output_len: 1000,
            preserve_formatting: true,
            processing_mode: ProcessingMode::Helpful,
            enabled_tools: [
                "uppercase",
                "lowercase",
                "titlecase",
                "count_words",
                "reverse",
                "extract_emails",
                "clean_whitespace",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl TextConfig {
    pub fn from_configurable(configurable: Option<&Value>) -> Result<Self, ConfigError> {
        let cfg: Self = deserialize_onto_defaults(configurable)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("temperature", self.temperature)?;
        check_range("max_output_len", i64::from(self.max_output_len), 100, 5000)?;
        if self.enabled_tools.is_empty() {
            return Err(ConfigError::Invalid {
                field: "enabled_tools",
                reason: "at least one tool must be enabled".to_string(),
            });
        }
        Ok(())
    }
}

/// Pick the API-key env var for a `provider:model` spec. Unknown providers
/// fall back to OPENAI_API_KEY so OpenAI-compatible gateways keep working.
pub fn api_key_var_for_model(model: &str) -> &'static str {
    let lowered = model.to_lowercase();
    if lowered.starts_with("anthropic:") {
        "ANTHROPIC_API_KEY"
    } else {
        "OPENAI_API_KEY"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn supervisor_defaults_validate() {
        SupervisorConfig::default().validate().unwrap();
    }

    #[test]
    fn configurable_overrides_defaults() {
        let cfg = SupervisorConfig::from_configurable(Some(&json!({
            "routing_strategy": "keyword",
            "max_delegations": 2,
        })))
        .unwrap();
        assert_eq!(cfg.routing_strategy, RoutingStrategy::Keyword);
        assert_eq!(cfg.max_delegations, 2);
        assert!(cfg.provide_context, "untouched fields keep their defaults");
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let err = SupervisorConfig::from_configurable(Some(&json!({ "temperature": 1.5 })))
            .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn precision_bounds_enforced() {
        let err = MathConfig::from_configurable(Some(&json!({ "precision": 11 }))).unwrap_err();
        assert!(err.to_string().contains("precision"));
        MathConfig::from_configurable(Some(&json!({ "precision": 10 }))).unwrap();
    }

    #[test]
    fn unknown_enum_value_rejected() {
        assert!(TextConfig::from_configurable(Some(&json!({
            "processing_mode": "chaotic",
        })))
        .is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(
            SupervisorConfig::from_configurable(Some(&json!({ "temperture": 0.2 }))).is_err()
        );
    }

    #[test]
    fn empty_tool_list_rejected() {
        assert!(TextConfig::from_configurable(Some(&json!({ "enabled_tools": [] }))).is_err());
    }

    #[test]
    fn api_key_selection_follows_provider_prefix() {
        assert_eq!(
            api_key_var_for_model("anthropic:claude-3-5-haiku-latest"),
            "ANTHROPIC_API_KEY"
        );
        assert_eq!(api_key_var_for_model("openai:gpt-4o"), "OPENAI_API_KEY");
        assert_eq!(api_key_var_for_model("llama-3-8b"), "OPENAI_API_KEY");
    }
}
