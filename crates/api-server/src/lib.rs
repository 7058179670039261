//! HTTP task wrapper around the `stock-model` analysis binary.

pub mod analysis_routes;
pub mod runner;
pub mod tasks;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use runner::{AnalysisRunner, RunResult};
pub use tasks::{TaskRecord, TaskRegistry, TaskStatus};

#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskRegistry,
    pub runner: Arc<AnalysisRunner>,
}

impl AppState {
    pub fn new(runner: AnalysisRunner) -> Self {
        Self {
            tasks: TaskRegistry::new(),
            runner: Arc::new(runner),
        }
    }
}

/// Error returned by handlers: an HTTP status plus the underlying cause.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.error);
        }
        let body = Json(json!({
            "success": false,
            "error": self.error.to_string(),
        }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path of the analysis binary.
    pub model_bin: PathBuf,
    pub model_workdir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()?;

        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            model_bin: std::env::var("MODEL_BIN")
                .unwrap_or_else(|_| "stock-model".to_string())
                .into(),
            model_workdir: std::env::var("MODEL_WORKDIR").ok().map(PathBuf::from),
        })
    }

    pub fn runner(&self) -> AnalysisRunner {
        let runner = AnalysisRunner::new(self.model_bin.clone());
        match &self.model_workdir {
            Some(dir) => runner.with_working_dir(dir.clone()),
            None => runner,
        }
    }
}

pub fn app(state: AppState) -> Router {
    analysis_routes::analysis_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let state = AppState::new(config.runner());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Stock Analysis API listening on {} (model: {})",
        addr,
        config.model_bin.display()
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
