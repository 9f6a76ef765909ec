use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::instrument;

use crate::config::{MathConfig, OutputFormat};
use crate::error::{Result, SwitchboardError};
use crate::llm_client::SharedLlmClient;

use super::traits::{AgentBehavior, AgentRequest, AgentResponse};

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex is valid"));

/// One completed tool invocation, with an optional work trace.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub tool: &'static str,
    pub rendered: String,
    pub work: Option<String>,
}

fn operand_error(tool: &str, reason: impl Into<String>) -> SwitchboardError {
    SwitchboardError::InvalidOperand {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

fn render_number(value: f64, precision: u8) -> String {
    let rounded = format!("{value:.prec$}", prec = precision as usize);
    // Trim trailing zeros so whole numbers read as integers (42, not 42.000).
    if rounded.contains('.') {
        rounded
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        rounded
    }
}

pub fn add(a: f64, b: f64, precision: u8) -> ToolRun {
    let result = a + b;
    ToolRun {
        tool: "add",
        rendered: format!(
            "{} + {} = {}",
            render_number(a, precision),
            render_number(b, precision),
            render_number(result, precision)
        ),
        work: Some(format!("added {a} and {b}")),
    }
}

pub fn multiply(a: f64, b: f64, precision: u8) -> ToolRun {
    let result = a * b;
    ToolRun {
        tool: "multiply",
        rendered: format!(
            "{} × {} = {}",
            render_number(a, precision),
            render_number(b, precision),
            render_number(result, precision)
        ),
        work: Some(format!("multiplied {a} by {b}")),
    }
}

pub fn sqrt(value: f64, precision: u8) -> Result<ToolRun> {
    if value < 0.0 {
        return Err(operand_error(
            "sqrt",
            "cannot take the square root of a negative number",
        ));
    }
    let result = value.sqrt();
    Ok(ToolRun {
        tool: "sqrt",
        rendered: format!(
            "√{} = {}",
            render_number(value, precision),
            render_number(result, precision)
        ),
        work: Some(format!("took the square root of {value}")),
    })
}

pub fn power(base: f64, exponent: f64, precision: u8) -> ToolRun {
    let result = base.powf(exponent);
    ToolRun {
        tool: "power",
        rendered: format!(
            "{}^{} = {}",
            render_number(base, precision),
            render_number(exponent, precision),
            render_number(result, precision)
        ),
        work: Some(format!("raised {base} to the power {exponent}")),
    }
}

pub fn factorial(n: f64) -> Result<ToolRun> {
    if n < 0.0 {
        return Err(operand_error(
            "factorial",
            "factorial is not defined for negative numbers",
        ));
    }
    if n.fract() != 0.0 {
        return Err(operand_error("factorial", "operand must be an integer"));
    }
    let n = n as u64;
    if n > 20 {
        return Err(operand_error("factorial", "operand too large (limit: 20)"));
    }
    let result: u128 = (1..=u128::from(n)).product::<u128>().max(1);
    Ok(ToolRun {
        tool: "factorial",
        rendered: format!("{n}! = {result}"),
        work: Some(format!("multiplied 1 through {n}")),
    })
}

fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

fn take_two(tool: &'static str, numbers: &[f64]) -> Result<(f64, f64)> {
    match numbers {
        [a, b, ..] => Ok((*a, *b)),
        _ => Err(operand_error(
            tool,
            format!(
                "expected 2 numeric operands, found {}; text where a number is required?",
                numbers.len()
            ),
        )),
    }
}

fn take_one(tool: &'static str, numbers: &[f64]) -> Result<f64> {
    numbers.first().copied().ok_or_else(|| {
        operand_error(
            tool,
            "expected a numeric operand, found none; text where a number is required?",
        )
    })
}

/// Deterministic tool selection: keyword match in a fixed priority order,
/// so identical sub-tasks always pick identical tools.
fn select_tools(lowered: &str) -> Vec<&'static str> {
    let mut selected = Vec::new();
    if lowered.contains("square root") || lowered.contains("sqrt") || lowered.contains('√') {
        selected.push("sqrt");
    }
    if lowered.contains("factorial") || lowered.contains('!') {
        selected.push("factorial");
    }
    if lowered.contains("power") || lowered.contains('^') || lowered.contains("squared") {
        selected.push("power");
    }
    if lowered.contains("multiply")
        || lowered.contains("times")
        || lowered.contains("product")
        || lowered.contains('*')
        || lowered.contains('×')
    {
        selected.push("multiply");
    }
    if lowered.contains("add")
        || lowered.contains("plus")
        || lowered.contains("sum")
        || lowered.contains('+')
    {
        selected.push("add");
    }
    selected
}

/// Math specialist: pure arithmetic tools selected from the sub-task text.
/// Configuration (precision, show_work, output format) applies uniformly to
/// every invocation within a run.
pub struct MathAgent {
    llm_client: SharedLlmClient,
}

impl MathAgent {
    const DIRECTIVE: &'static str = "You are the math specialist. Solve the arithmetic in the user brief step by step and state the final numeric result plainly.";
    pub const NAME: &'static str = "math_agent";
    pub const CAPABILITIES: &'static [&'static str] = &[
        "math",
        "calculate",
        "calculation",
        "arithmetic",
        "add",
        "plus",
        "sum",
        "multiply",
        "times",
        "square root",
        "sqrt",
        "power",
        "squared",
        "factorial",
        "equation",
        "number",
        "+",
        "*",
    ];

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }

    fn run_tool(&self, tool: &'static str, numbers: &[f64], cfg: &MathConfig) -> Result<ToolRun> {
        if !cfg.enabled_tools.iter().any(|t| t == tool) {
            return Err(SwitchboardError::UnknownTool {
                name: tool.to_string(),
            });
        }

        match tool {
            "add" => {
                let (a, b) = take_two("add", numbers)?;
                Ok(add(a, b, cfg.precision))
            }
            "multiply" => {
                let (a, b) = take_two("multiply", numbers)?;
                Ok(multiply(a, b, cfg.precision))
            }
            "sqrt" => sqrt(take_one("sqrt", numbers)?, cfg.precision),
            "power" => {
                // "N squared" carries a single operand with an implied exponent.
                match numbers {
                    [base, exponent, ..] => Ok(power(*base, *exponent, cfg.precision)),
                    [base] => Ok(power(*base, 2.0, cfg.precision)),
                    [] => Err(operand_error("power", "expected numeric operands")),
                }
            }
            "factorial" => factorial(take_one("factorial", numbers)?),
            other => Err(SwitchboardError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    fn compose_output(&self, runs: &[ToolRun], cfg: &MathConfig) -> String {
        let mut lines = Vec::with_capacity(runs.len() * 2);
        for (step, run) in runs.iter().enumerate() {
            match cfg.output_format {
                OutputFormat::Concise => lines.push(
                    run.rendered
                        .rsplit_once("= ")
                        .map(|(_, tail)| tail.to_string())
                        .unwrap_or_else(|| run.rendered.clone()),
                ),
                OutputFormat::Detailed => lines.push(run.rendered.clone()),
                OutputFormat::Steps => lines.push(format!("{}. {}", step + 1, run.rendered)),
            }
            if cfg.show_work {
                if let Some(work) = &run.work {
                    lines.push(format!("  work: {work}"));
                }
            }
        }
        lines.join("\n")
    }
}

#[async_trait]
impl AgentBehavior for MathAgent {
    #[instrument(skip_all, fields(role = "math_agent", input = %request.input))]
    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse> {
        let cfg = MathConfig::from_configurable(request.configurable.as_ref())?;
        let lowered = request.input.to_lowercase();
        let tools = select_tools(&lowered);

        if tools.is_empty() {
            // Nothing deterministic matched; let the model answer the brief.
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

        let numbers = extract_numbers(&request.input);
        let mut runs = Vec::with_capacity(tools.len());
        for tool in tools {
            runs.push(self.run_tool(tool, &numbers, &cfg)?);
        }

        let output = self.compose_output(&runs, &cfg);
        let trace = runs
            .iter()
            .map(|run| {
                json!({
                    "tool": run.tool,
                    "result": run.rendered,
                    "work": run.work,
                })
            })
            .collect::<Vec<_>>();

        Ok(AgentResponse::with_metadata(
            output,
            json!({ "tools": trace, "precision": cfg.precision }),
        ))
    }
}
