mod agents;
mod config;
mod error;
mod llm_client;
mod orchestrator;
mod remote;
mod server;
mod thread;

use std::io::{self, Write};
use std::sync::Arc;

use agents::{AgentBehavior, AgentRequest, AgentResponse, MathAgent, TextAgent};
use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use config::{MathConfig, SupervisorConfig, SystemConfig, TextConfig};
use error::{Result as SbResult, SwitchboardError};
use llm_client::build_llm_client;
use orchestrator::{AgentDescriptor, AgentRegistry, DelegationTransport, Supervisor};
use remote::RemoteAgentClient;
use server::{AgentRole, AppState, RoleRunner};
use thread::{new_thread_id, ThreadStore};
use tracing::{error, info};

const SUPERVISOR_DIRECTIVE: &str = "You are the supervisor of a specialist agent network. \
Coordinate and synthesize specialist results; never repeat information the specialists \
already provided.";

const MATH_DIRECTIVE: &str = "You are a helpful mathematical assistant. Solve problems step \
by step and show your work clearly.";

const TEXT_DIRECTIVE: &str = "You are a helpful text processing assistant. Manipulate, \
analyze, and transform text efficiently and accurately.";

#[derive(Parser, Debug)]
#[command(
    name = "switchboard",
    about = "Supervisor + specialist agent demo network (math and text specialists behind a routing supervisor)"
)]
struct Cli {
    /// Optional one-shot prompt handled by an in-process supervisor; if
    /// omitted and no subcommand is given, the CLI enters interactive mode.
    #[arg(short, long)]
    prompt: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one agent role as an HTTP service.
    Serve {
        /// Which agent this process hosts.
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Listen port; defaults to the role's well-known port (2024-2026).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Probe the health endpoint of every configured agent.
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Supervisor,
    Math,
    Text,
}

impl From<RoleArg> for AgentRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Supervisor => AgentRole::Supervisor,
            RoleArg::Math => AgentRole::Math,
            RoleArg::Text => AgentRole::Text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { role, port }) => {
            let role = AgentRole::from(role);
            let state = build_role_state(role)?;
            let port = port.unwrap_or_else(|| role.default_port());
            server::serve(state, port).await
        }
        Some(Commands::Status) => run_status().await,
        None => {
            let supervisor = build_local_supervisor()?;
            match cli.prompt {
                Some(prompt) => run_single(&supervisor, &new_thread_id(), prompt).await,
                None => run_repl(&supervisor).await,
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

/// Served roles never fall back to the scripted stub: a missing API key
/// should fail startup, not silently serve canned replies.
fn build_specialist(role: AgentRole) -> anyhow::Result<Arc<dyn AgentBehavior>> {
    let agent: Arc<dyn AgentBehavior> = match role {
        AgentRole::Math => {
            let cfg = MathConfig::default();
            let llm = build_llm_client(&cfg.model, cfg.temperature, MATH_DIRECTIVE, false)?;
            Arc::new(MathAgent::new(llm))
        }
        AgentRole::Text => {
            let cfg = TextConfig::default();
            let llm = build_llm_client(&cfg.model, cfg.temperature, TEXT_DIRECTIVE, false)?;
            Arc::new(TextAgent::new(llm))
        }
        AgentRole::Supervisor => anyhow::bail!("supervisor is not a specialist"),
    };
    Ok(agent)
}

fn build_role_state(role: AgentRole) -> anyhow::Result<AppState> {
    let runner = match role {
        AgentRole::Supervisor => {
            let system = SystemConfig::from_env();
            let registry = AgentRegistry::from_system_config(&system)
                .context("building the agent registry")?;
            let defaults = SupervisorConfig::default();
            let llm = build_llm_client(
                &defaults.model,
                defaults.temperature,
                SUPERVISOR_DIRECTIVE,
                false,
            )?;
            let transport =
                Arc::new(RemoteAgentClient::new().context("building the delegation client")?);
            RoleRunner::Supervisor(Supervisor::new(
                registry,
                llm,
                transport,
                ThreadStore::shared(),
                defaults,
            ))
        }
        AgentRole::Math | AgentRole::Text => RoleRunner::Specialist(build_specialist(role)?),
    };
    Ok(AppState::new(role, runner))
}

/// Runs the specialists inside this process so the one-shot and REPL modes
/// work without any servers or network.
struct InProcessTransport {
    math: MathAgent,
    text: TextAgent,
}

#[async_trait]
impl DelegationTransport for InProcessTransport {
    async fn invoke(
        &self,
        descriptor: &AgentDescriptor,
        request: AgentRequest,
    ) -> SbResult<AgentResponse> {
        match descriptor.name.as_str() {
            MathAgent::NAME => self.math.handle(request).await,
            TextAgent::NAME => self.text.handle(request).await,
            other => Err(SwitchboardError::UnknownAgent {
                name: other.to_string(),
            }),
        }
    }
}

fn build_local_supervisor() -> anyhow::Result<Arc<Supervisor>> {
    let system = SystemConfig::from_env();
    let registry =
        AgentRegistry::from_system_config(&system).context("building the agent registry")?;
    let defaults = SupervisorConfig::default();
    let llm = build_llm_client(
        &defaults.model,
        defaults.temperature,
        SUPERVISOR_DIRECTIVE,
        true,
    )?;

    let math_cfg = MathConfig::default();
    let text_cfg = TextConfig::default();
    let transport = Arc::new(InProcessTransport {
        math: MathAgent::new(build_llm_client(
            &math_cfg.model,
            math_cfg.temperature,
            MATH_DIRECTIVE,
            true,
        )?),
        text: TextAgent::new(build_llm_client(
            &text_cfg.model,
            text_cfg.temperature,
            TEXT_DIRECTIVE,
            true,
        )?),
    });

    Ok(Supervisor::new(
        registry,
        llm,
        transport,
        ThreadStore::shared(),
        defaults,
    ))
}

async fn run_single(
    supervisor: &Supervisor,
    thread_id: &str,
    prompt: String,
) -> anyhow::Result<()> {
    let thread_id = thread_id.to_string();
    let response = supervisor
        .handle_turn(&thread_id, &prompt, None)
        .await
        .map_err(|err| {
            error!(?err, "Turn failed");
            anyhow::anyhow!(err)
        })?;

    println!("\nSupervisor:\n{}\n", response.output);
    Ok(())
}

async fn run_repl(supervisor: &Supervisor) -> anyhow::Result<()> {
    println!("Switchboard supervisor ready. Type 'exit' to quit.\n");
    let stdin = io::stdin();
    let thread_id = new_thread_id();

    loop {
        print!("You > ");
        io::stdout().flush()?;

        let mut buffer = String::new();
        stdin.read_line(&mut buffer)?;
        let trimmed = buffer.trim();

        if trimmed.eq_ignore_ascii_case("exit") {
            info!("User exited CLI");
            break;
        }

        if trimmed.is_empty() {
            continue;
        }

        run_single(supervisor, &thread_id, trimmed.to_owned()).await?;
    }

    Ok(())
}

async fn run_status() -> anyhow::Result<()> {
    let system = SystemConfig::from_env();
    let registry =
        AgentRegistry::from_system_config(&system).context("building the agent registry")?;
    let client = RemoteAgentClient::new()?;

    let supervisor = AgentDescriptor::new(
        "supervisor",
        format!("http://localhost:{}", system.supervisor_port),
        &[],
    );

    for descriptor in std::iter::once(&supervisor).chain(registry.iter()) {
        if client.is_healthy(descriptor).await {
            println!("✅ {} healthy at {}", descriptor.name, descriptor.base_url);
        } else {
            println!("⚠️ {} not available at {}", descriptor.name, descriptor.base_url);
        }
    }

    Ok(())
}
