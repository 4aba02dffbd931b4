//! Thin axum HTTP shell exposing `POST /suites` over
//! `Supervisor::synthesize_suite`. Authentication, CORS policy, dataset
//! import and progress-reporting depth are explicitly out of scope (spec.md
//! §1 Non-goals); this binary only wires the real collaborators together and
//! serves the one endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use testsynth::compiler::{CxxCompiler, NativeCompiler};
use testsynth::config::{SynthesisOptions, Timeouts};
use testsynth::error::SynthesisError;
use testsynth::generator_runner::SubprocessGeneratorRunner;
use testsynth::llm::gateway::{FallbackGateway, LlmBackend, LlmGateway};
use testsynth::llm::rest::RestBackend;
use testsynth::llm::vertex::VertexBackend;
use testsynth::oracle::SubprocessOracleRunner;
use testsynth::prompts::{FilePromptStore, PromptManager};
use testsynth::supervisor::Supervisor;
use testsynth::types::{ProblemBundle, SynthesisResult};
use testsynth::validator_runner::SubprocessValidatorRunner;

#[derive(Parser)]
#[command(name = "testsynth-gateway")]
#[command(author, version)]
#[command(about = "HTTP shell over the generator-validator supervision loop")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8080", env = "TESTSYNTH_BIND_ADDR")]
    bind_addr: String,

    #[arg(long, default_value = "assets/prompts/testsynth", env = "TESTSYNTH_PROMPTS_DIR")]
    prompts_dir: PathBuf,

    #[arg(long, default_value = "workdir", env = "TESTSYNTH_WORK_DIR")]
    work_dir: PathBuf,

    /// REST backend base URL (OpenAI-compatible `/chat/completions`).
    #[arg(long, env = "TESTSYNTH_REST_BASE_URL")]
    rest_base_url: Option<String>,

    #[arg(long, default_value = "gpt-4", env = "TESTSYNTH_REST_MODEL")]
    rest_model: String,

    /// Comma-separated API keys for the REST backend, rotated on rate limit.
    #[arg(long, value_delimiter = ',', env = "TESTSYNTH_REST_API_KEYS")]
    rest_api_keys: Vec<String>,

    #[arg(long, env = "TESTSYNTH_VERTEX_PROJECT_ID")]
    vertex_project_id: Option<String>,

    #[arg(long, default_value = "us-central1", env = "TESTSYNTH_VERTEX_LOCATION")]
    vertex_location: String,

    #[arg(long, default_value = "gemini-1.5-pro", env = "TESTSYNTH_VERTEX_MODEL")]
    vertex_model: String,

    #[arg(long, env = "TESTSYNTH_VERTEX_ACCESS_TOKEN")]
    vertex_access_token: Option<String>,
}

#[derive(Clone)]
struct AppState {
    supervisor: Arc<Supervisor<FilePromptStore>>,
    options: Arc<SynthesisOptions>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "gateway exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    std::fs::create_dir_all(&cli.work_dir).map_err(|e| format!("failed to create work dir: {}", e))?;

    let mut backends: Vec<Arc<dyn LlmBackend>> = Vec::new();
    if let (Some(project_id), Some(access_token)) = (&cli.vertex_project_id, &cli.vertex_access_token) {
        backends.push(Arc::new(VertexBackend::new(
            project_id.clone(),
            cli.vertex_location.clone(),
            cli.vertex_model.clone(),
            access_token.clone(),
            Duration::from_secs(180),
        )));
    }
    if let Some(base_url) = &cli.rest_base_url {
        backends.push(Arc::new(RestBackend::new(
            base_url.clone(),
            cli.rest_model.clone(),
            cli.rest_api_keys.clone(),
            Duration::from_secs(180),
        )));
    }
    if backends.is_empty() {
        return Err("no LLM backend configured; pass --vertex-project-id/--vertex-access-token or --rest-base-url".to_string());
    }
    let gateway: Arc<dyn LlmGateway> = Arc::new(FallbackGateway::new(backends));

    let prompts = Arc::new(PromptManager::new(FilePromptStore::new(&cli.prompts_dir)));
    let timeouts = Timeouts::default();
    let compiler: Arc<dyn NativeCompiler> = Arc::new(CxxCompiler::new(timeouts.clone(), cli.work_dir.clone()));
    let generator_runner = Arc::new(SubprocessGeneratorRunner::new(timeouts.clone()));
    let validator_runner = Arc::new(SubprocessValidatorRunner::new(timeouts.clone()));
    let oracle_runner = Arc::new(SubprocessOracleRunner::new(timeouts));

    let supervisor = Arc::new(Supervisor::new(
        compiler,
        generator_runner,
        validator_runner,
        oracle_runner,
        gateway,
        prompts,
    ));

    let state = AppState {
        supervisor,
        options: Arc::new(SynthesisOptions::from_env()),
    };

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/suites", post(synthesize))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = cli
        .bind_addr
        .parse()
        .map_err(|e| format!("invalid bind address {}: {}", cli.bind_addr, e))?;
    tracing::info!(%addr, "starting testsynth gateway");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {}", e))
}

async fn health() -> &'static str {
    "ok"
}

async fn synthesize(
    State(state): State<AppState>,
    Json(bundle): Json<ProblemBundle>,
) -> Result<Json<SynthesisResult>, (StatusCode, String)> {
    state
        .supervisor
        .synthesize_suite(&bundle, &state.options)
        .await
        .map(Json)
        .map_err(|e| (status_for(&e), e.to_string()))
}

fn status_for(e: &SynthesisError) -> StatusCode {
    match e {
        SynthesisError::ToolchainMissing => StatusCode::SERVICE_UNAVAILABLE,
        SynthesisError::AllBackendsFailed(_) => StatusCode::BAD_GATEWAY,
        SynthesisError::NoCandidates | SynthesisError::OracleAllFailed => StatusCode::UNPROCESSABLE_ENTITY,
    }
}
