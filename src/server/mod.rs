//! HTTP surface shared by every agent role.
//!
//! Provides:
//! - `GET  /health`: role + version probe
//! - `POST /runs`: create a run from `{input, thread_id?, thread?, configurable?}`
//! - `GET  /runs/:id`: poll run status
//! - `GET  /runs/:id/output`: fetch the final output once completed

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::agents::{AgentBehavior, AgentRequest, AgentResponse};
use crate::orchestrator::Supervisor;
use crate::remote::{
    CreateRunRequest, RunCreated, RunOutputResponse, RunStatus, RunStatusResponse,
};
use crate::thread::new_thread_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Supervisor,
    Math,
    Text,
}

impl AgentRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Math => "math_agent",
            Self::Text => "text_agent",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Supervisor => crate::config::SystemConfig::DEFAULT_SUPERVISOR_PORT,
            Self::Math => crate::config::SystemConfig::DEFAULT_MATH_PORT,
            Self::Text => crate::config::SystemConfig::DEFAULT_TEXT_PORT,
        }
    }
}

/// What actually executes a run for this process: the supervisor's turn
/// loop, or a single specialist.
#[derive(Clone)]
pub enum RoleRunner {
    Supervisor(Arc<Supervisor>),
    Specialist(Arc<dyn AgentBehavior>),
}

#[derive(Debug)]
struct RunRecord {
    thread_id: String,
    status: RunStatus,
    error: Option<String>,
    output: Option<AgentResponse>,
}

/// In-memory run registry; the on-disk operational state (logs, PID files)
/// belongs to the process-control scripts.
#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl RunStore {
    async fn create(&self, thread_id: String) -> String {
        let run_id = Uuid::new_v4().to_string();
        let mut runs = self.runs.write().await;
        runs.insert(
            run_id.clone(),
            RunRecord {
                thread_id,
                status: RunStatus::Pending,
                error: None,
                output: None,
            },
        );
        run_id
    }

    async fn mark_running(&self, run_id: &str) {
        if let Some(record) = self.runs.write().await.get_mut(run_id) {
            record.status = RunStatus::Running;
        }
    }

    async fn complete(&self, run_id: &str, response: AgentResponse) {
        if let Some(record) = self.runs.write().await.get_mut(run_id) {
            record.status = RunStatus::Completed;
            record.output = Some(response);
        }
    }

    async fn fail(&self, run_id: &str, error: String) {
        if let Some(record) = self.runs.write().await.get_mut(run_id) {
            record.status = RunStatus::Failed;
            record.error = Some(error);
        }
    }

    async fn status(&self, run_id: &str) -> Option<RunStatusResponse> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|record| RunStatusResponse {
            run_id: run_id.to_string(),
            thread_id: record.thread_id.clone(),
            status: record.status,
            error: record.error.clone(),
        })
    }

    async fn output(&self, run_id: &str) -> Option<(RunStatus, Option<RunOutputResponse>)> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|record| {
            let output = record.output.as_ref().map(|response| RunOutputResponse {
                output: response.output.clone(),
                metadata: response.metadata.clone(),
            });
            (record.status, output)
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    role: AgentRole,
    runner: RoleRunner,
    runs: Arc<RunStore>,
}

impl AppState {
    pub fn new(role: AgentRole, runner: RoleRunner) -> Self {
        Self {
            role,
            runner,
            runs: Arc::new(RunStore::default()),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    role: &'static str,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        role: state.role.name(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip_all, fields(role = state.role.name(), input = %request.input))]
async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> (StatusCode, Json<RunCreated>) {
    let thread_id = request.thread_id.clone().unwrap_or_else(new_thread_id);
    let run_id = state.runs.create(thread_id.clone()).await;
    info!(run_id, "Run created");

    let created = RunCreated {
        run_id: run_id.clone(),
        thread_id: thread_id.clone(),
        status: RunStatus::Pending,
    };

    let runs = state.runs.clone();
    let runner = state.runner.clone();
    tokio::spawn(async move {
        runs.mark_running(&run_id).await;
        let result = match runner {
            RoleRunner::Supervisor(supervisor) => {
                supervisor
                    .handle_turn(&thread_id, &request.input, request.configurable.as_ref())
                    .await
            }
            RoleRunner::Specialist(agent) => {
                let mut agent_request = AgentRequest::new(request.input);
                if let Some(thread) = request.thread {
                    agent_request = agent_request.with_thread(thread);
                }
                if let Some(configurable) = request.configurable {
                    agent_request = agent_request.with_configurable(configurable);
                }
                agent.handle(agent_request).await
            }
        };

        match result {
            Ok(response) => runs.complete(&run_id, response).await,
            Err(err) => {
                error!(run_id, %err, "Run failed");
                runs.fail(&run_id, err.to_string()).await;
            }
        }
    });

    (StatusCode::ACCEPTED, Json(created))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, StatusCode> {
    state
        .runs
        .status(&run_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_run_output(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunOutputResponse>, StatusCode> {
    match state.runs.output(&run_id).await {
        None => Err(StatusCode::NOT_FOUND),
        Some((RunStatus::Completed, Some(output))) => Ok(Json(output)),
        Some((RunStatus::Failed, _)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        // Still pending or running.
        Some(_) => Err(StatusCode::CONFLICT),
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/runs", post(create_run))
        .route("/runs/:run_id", get(get_run))
        .route("/runs/:run_id/output", get(get_run_output))
        .with_state(state)
}

/// Binds and serves one agent role until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let role = state.role;
    let app = routes(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(role = role.name(), port, "Agent listening");
    axum::serve(listener, app).await?;
    Ok(())
}
