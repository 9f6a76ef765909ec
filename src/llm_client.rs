use std::env;
use std::sync::Arc;

use anyhow::Context;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client as AsyncOpenAiClient};
use async_trait::async_trait;
use tracing::instrument;

use crate::config::api_key_var_for_model;

pub type SharedLlmClient = Arc<dyn LlmClient>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Deterministic stand-in used when no API key is configured and in tests.
/// Replays canned responses in order, then echoes.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: std::sync::Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
        }
    }

    pub fn shared() -> SharedLlmClient {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted response queue poisoned"))?;
        if responses.is_empty() {
            Ok(format!("[scripted reply] {prompt}"))
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// OpenAI-compatible client; the model spec may carry a `provider:` prefix
/// (`anthropic:` / `openai:`) which only selects the API-key variable. The
/// wire request always speaks the OpenAI chat protocol.
pub struct OpenAiLlmClient {
    client: AsyncOpenAiClient<OpenAIConfig>,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl OpenAiLlmClient {
    pub fn shared(
        model_spec: &str,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> anyhow::Result<SharedLlmClient> {
        let key_var = api_key_var_for_model(model_spec);
        let api_key = env::var(key_var)
            .with_context(|| format!("set {key_var} to use model '{model_spec}'"))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            config = config.with_api_base(base_url);
        }

        let model = model_spec
            .split_once(':')
            .map(|(_, name)| name)
            .unwrap_or(model_spec)
            .to_string();

        Ok(Arc::new(Self {
            client: AsyncOpenAiClient::with_config(config),
            model,
            temperature,
            system_prompt: system_prompt.into(),
        }))
    }

    #[instrument(level = "debug", skip_all)]
    async fn chat(&self, prompt: &str) -> anyhow::Result<String> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(&self.system_prompt)
            .build()?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(vec![system_message.into(), user_message.into()])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .context("LLM response did not contain any choices")?;

        let output = choice
            .message
            .content
            .clone()
            .unwrap_or_else(|| String::from("[empty LLM response]"));

        Ok(output)
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.chat(prompt).await
    }
}

/// Build a client for the configured model, falling back to the scripted
/// stub when the relevant API key is absent.
pub fn build_llm_client(
    model_spec: &str,
    temperature: f32,
    system_prompt: &str,
    default_to_stub: bool,
) -> anyhow::Result<SharedLlmClient> {
    match OpenAiLlmClient::shared(model_spec, temperature, system_prompt) {
        Ok(client) => Ok(client),
        Err(err) if default_to_stub => {
            tracing::warn!(?err, "No API key for model; using scripted LLM stub");
            Ok(ScriptedLlmClient::shared())
        }
        Err(err) => Err(err),
    }
}
