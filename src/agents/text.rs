use async_trait::async_trait;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::instrument;

use crate::config::{ProcessingMode, TextConfig};
use crate::error::{Result, SwitchboardError};
use crate::llm_client::SharedLlmClient;

use super::traits::{AgentBehavior, AgentRequest, AgentResponse};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex is valid")
});
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quote regex is valid"));

pub fn uppercase(text: &str) -> String {
    text.to_uppercase()
}

pub fn lowercase(text: &str) -> String {
    text.to_lowercase()
}

pub fn titlecase(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

pub fn count_words(text: &str) -> String {
    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    let chars_no_spaces = text.chars().filter(|c| !c.is_whitespace()).count();
    let lines = text.lines().count().max(1);
    format!(
        "Words: {words}, Characters: {chars}, Characters (no spaces): {chars_no_spaces}, Lines: {lines}"
    )
}

pub fn reverse(text: &str) -> String {
    text.chars().rev().collect()
}

pub fn extract_emails(text: &str) -> String {
    let emails: Vec<&str> = EMAIL_RE.find_iter(text).map(|m| m.as_str()).collect();
    if emails.is_empty() {
        "No email addresses found".to_string()
    } else {
        format!("Found {} email(s): {}", emails.len(), emails.join(", "))
    }
}

pub fn clean_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn encode_base64(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

pub fn decode_base64(text: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|err| SwitchboardError::InvalidOperand {
            tool: "decode_base64".to_string(),
            reason: format!("not valid base64: {err}"),
        })?;
    String::from_utf8(bytes).map_err(|_| SwitchboardError::InvalidOperand {
        tool: "decode_base64".to_string(),
        reason: "decoded bytes are not valid UTF-8".to_string(),
    })
}

/// The payload a tool operates on: text after a colon, else the first
/// quoted segment, else the whole sub-task.
fn extract_payload(input: &str) -> &str {
    if let Some((_, tail)) = input.split_once(':') {
        let tail = tail.trim();
        if !tail.is_empty() {
            return tail;
        }
    }
    if let Some(caps) = QUOTED_RE.captures(input) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            return m.as_str();
        }
    }
    input.trim()
}

/// Deterministic tool selection in a fixed priority order.
fn select_tools(lowered: &str) -> Vec<&'static str> {
    let mut selected = Vec::new();
    if lowered.contains("uppercase") || lowered.contains("upper case") {
        selected.push("uppercase");
    }
    if lowered.contains("lowercase") || lowered.contains("lower case") {
        selected.push("lowercase");
    }
    if lowered.contains("title case") || lowered.contains("titlecase") {
        selected.push("titlecase");
    }
    if lowered.contains("count") && (lowered.contains("word") || lowered.contains("character")) {
        selected.push("count_words");
    }
    if lowered.contains("reverse") {
        selected.push("reverse");
    }
    if lowered.contains("email") {
        selected.push("extract_emails");
    }
    if lowered.contains("whitespace") || lowered.contains("clean up") || lowered.contains("spaces")
    {
        selected.push("clean_whitespace");
    }
    if lowered.contains("hash") {
        selected.push("hash");
    }
    if lowered.contains("base64") {
        if lowered.contains("decode") {
            selected.push("decode_base64");
        } else {
            selected.push("encode_base64");
        }
    }
    selected
}

/// Text specialist: pure transformation tools over the sub-task payload.
/// All tools are idempotent-safe under repeated identical input where the
/// transformation allows it (case conversion, cleaning).
pub struct TextAgent {
    llm_client: SharedLlmClient,
}

impl TextAgent {
    const DIRECTIVE: &'static str = "You are the text specialist. Transform or analyze the text in the user brief exactly as asked and return the processed result.";
    pub const NAME: &'static str = "text_agent";
    pub const CAPABILITIES: &'static [&'static str] = &[
        "text",
        "uppercase",
        "lowercase",
        "title case",
        "convert",
        "format",
        "string",
        "word",
        "words",
        "reverse",
        "email",
        "whitespace",
        "hash",
        "base64",
        "count",
        "analyze",
    ];

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }

    fn run_tool(&self, tool: &'static str, payload: &str, cfg: &TextConfig) -> Result<String> {
        if !cfg.enabled_tools.iter().any(|t| t == tool) {
            return Err(SwitchboardError::UnknownTool {
                name: tool.to_string(),
            });
        }
        if payload.is_empty() {
            return Err(SwitchboardError::InvalidOperand {
                tool: tool.to_string(),
                reason: "no text to operate on".to_string(),
            });
        }

        Ok(match tool {
            "uppercase" => uppercase(payload),
            "lowercase" => lowercase(payload),
            "titlecase" => titlecase(payload),
            "count_words" => count_words(payload),
            "reverse" => reverse(payload),
            "extract_emails" => extract_emails(payload),
            "clean_whitespace" => clean_whitespace(payload),
            "hash" => hash_text(payload),
            "encode_base64" => encode_base64(payload),
            "decode_base64" => decode_base64(payload)?,
            other => {
                return Err(SwitchboardError::UnknownTool {
                    name: other.to_string(),
                })
            }
        })
    }

    fn frame_output(&self, tool_lines: Vec<(String, String)>, cfg: &TextConfig) -> String {
        let body = tool_lines
            .iter()
            .map(|(tool, result)| match cfg.processing_mode {
                ProcessingMode::Efficient => result.clone(),
                ProcessingMode::Helpful => format!("{tool}: {result}"),
                ProcessingMode::Educational => {
                    format!("{tool} (applied to your text): {result}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        // max_output_len bounds the processed text, not a hard protocol limit.
        if body.chars().count() > cfg.max_output_len as usize {
            body.chars().take(cfg.max_output_len as usize).collect()
        } else {
            body
        }
    }
}

#[async_trait]
impl AgentBehavior for TextAgent {
    #[instrument(skip_all, fields(role = "text_agent", input = %request.input))]
    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse> {
        let cfg = TextConfig::from_configurable(request.configurable.as_ref())?;
        let lowered = request.input.to_lowercase();
        let tools = select_tools(&lowered);

        if tools.is_empty() {
            let prompt = format!(
                "{}\n\nUser brief:\n{}",
                Self::DIRECTIVE,
                request.input.trim()
            );
            let output =
                self.llm_client
                    .complete(&prompt)
                    .await
                    .map_err(|err| SwitchboardError::Transport {
                        agent: Self::NAME.to_string(),
                        source: err,
                    })?;
            return Ok(AgentResponse::new(output));
        }

        let payload = if cfg.preserve_formatting {
            extract_payload(&request.input).to_string()
        } else {
            clean_whitespace(extract_payload(&request.input))
        };

        let mut results = Vec::with_capacity(tools.len());
        for tool in tools {
            results.push((tool.to_string(), self.run_tool(tool, &payload, &cfg)?));
        }

        let trace = results
            .iter()
            .map(|(tool, result)| json!({ "tool": tool, "result": result }))
            .collect::<Vec<_>>();
        let output = self.frame_output(results, &cfg);

        Ok(AgentResponse::with_metadata(
            output,
            json!({ "tools": trace }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ScriptedLlmClient;

    fn agent() -> TextAgent {
        TextAgent::new(ScriptedLlmClient::shared())
    }

    #[tokio::test]
    async fn uppercase_hello() {
        let response = agent()
            .handle(AgentRequest::new("Convert this text to uppercase: hello"))
            .await
            .unwrap();
        assert!(response.output.contains("HELLO"), "got: {}", response.output);
    }

    #[test]
    fn transformations_are_idempotent() {
        let once = uppercase("hello world");
        assert_eq!(uppercase(&once), once);

        let cleaned = clean_whitespace("  too    many   spaces ");
        assert_eq!(clean_whitespace(&cleaned), cleaned);

        let lowered = lowercase("MiXeD");
        assert_eq!(lowercase(&lowered), lowered);
    }

    #[test]
    fn reverse_round_trips() {
        assert_eq!(reverse(&reverse("Hello")), "Hello");
        assert_eq!(reverse("abc"), "cba");
    }

    #[test]
    fn count_words_reports_all_measures() {
        let report = count_words("The quick brown fox");
        assert!(report.contains("Words: 4"));
        assert!(report.contains("Lines: 1"));
    }

    #[test]
    fn email_extraction() {
        let found = extract_emails("reach me at ada@example.com or ops@demo.io");
        assert!(found.contains("2 email(s)"));
        assert!(found.contains("ada@example.com"));
        assert_eq!(extract_emails("no addresses here"), "No email addresses found");
    }

    #[test]
    fn payload_prefers_colon_tail() {
        assert_eq!(extract_payload("uppercase this: hello world"), "hello world");
        assert_eq!(extract_payload("reverse 'abc' please"), "abc");
        assert_eq!(extract_payload("just some text"), "just some text");
    }

    #[test]
    fn base64_round_trips() {
        assert_eq!(encode_base64("Hello"), "SGVsbG8=");
        assert_eq!(decode_base64("SGVsbG8=").unwrap(), "Hello");
    }

    #[test]
    fn invalid_base64_is_an_operand_error() {
        assert!(matches!(
            decode_base64("%%%not base64%%%"),
            Err(SwitchboardError::InvalidOperand { .. })
        ));
    }

    #[tokio::test]
    async fn base64_tools_require_explicit_enablement() {
        // Not in the default tool set.
        let err = agent()
            .handle(AgentRequest::new("encode this as base64: hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::UnknownTool { .. }));

        let request = AgentRequest::new("encode this as base64: hi")
            .with_configurable(serde_json::json!({ "enabled_tools": ["encode_base64"] }));
        let response = agent().handle(request).await.unwrap();
        assert!(response.output.contains("aGk="), "got: {}", response.output);
    }

    #[tokio::test]
    async fn disabled_tool_is_rejected() {
        let request = AgentRequest::new("hash this: abc")
            .with_configurable(serde_json::json!({ "enabled_tools": ["uppercase"] }));
        let err = agent().handle(request).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn output_respects_max_len() {
        let request = AgentRequest::new(format!("uppercase this: {}", "a".repeat(400)))
            .with_configurable(serde_json::json!({ "max_output_len": 100 }));
        let response = agent().handle(request).await.unwrap();
        assert!(response.output.chars().count() <= 100);
    }
}
