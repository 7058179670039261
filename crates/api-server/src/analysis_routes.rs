use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use forecast_core::AnalysisParams;
use serde::Serialize;
use serde_json::{json, Value};

use crate::runner::{spawn_supervised, RunResult};
use crate::tasks::{TaskRecord, TaskRegistry, TaskStatus};
use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskLogsResponse {
    pub task_id: String,
    pub logs: Vec<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub result: RunResult,
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze", post(submit_analysis))
        .route("/analyze/sync", post(run_analysis_sync))
        .route("/analyze/:task_id", get(get_task))
        .route("/analyze/:task_id/logs", get(get_task_logs))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Stock Analysis API is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "stock-analysis" }))
}

/// Unwrap and validate a submission body; every problem is a 400.
fn validated(body: Result<Json<AnalysisParams>, JsonRejection>) -> Result<AnalysisParams, AppError> {
    let Json(params) = body.map_err(|e| {
        AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!("{}", e.body_text()))
    })?;
    params
        .validate()
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, e))?;
    Ok(params)
}

/// Start an analysis in the background and return its task id.
async fn submit_analysis(
    State(state): State<AppState>,
    body: Result<Json<AnalysisParams>, JsonRejection>,
) -> Result<Json<SubmitResponse>, AppError> {
    let params = validated(body)?;
    let task_id = TaskRegistry::new_task_id(&params.ticker);

    tracing::info!(
        "Creating task {}: ticker={}, start={}, test_pct={}, forecast={}",
        task_id,
        params.ticker,
        params.start_date,
        params.test_size_pct,
        params.forecast_days
    );

    state.tasks.register(&task_id, params.clone());
    spawn_supervised(
        state.tasks.clone(),
        state.runner.clone(),
        task_id.clone(),
        params.clone(),
    );

    Ok(Json(SubmitResponse {
        success: true,
        message: format!("Analysis for {} started in the background", params.ticker),
        task_id: Some(task_id),
    }))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, AppError> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| task_not_found(&task_id))
}

async fn get_task_logs(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskLogsResponse>, AppError> {
    let (logs, status) = state
        .tasks
        .logs(&task_id)
        .ok_or_else(|| task_not_found(&task_id))?;

    Ok(Json(TaskLogsResponse {
        task_id,
        logs,
        status,
    }))
}

/// Run an analysis inline. Can take minutes.
async fn run_analysis_sync(
    State(state): State<AppState>,
    body: Result<Json<AnalysisParams>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    let params = validated(body)?;
    tracing::info!("Running synchronous analysis for {}", params.ticker);

    // Own task so a disconnecting client does not cut the run short
    let runner = state.runner.clone();
    let run_params = params.clone();
    let result = tokio::spawn(async move { runner.run(&run_params, |_| {}).await })
        .await
        .map_err(|e| anyhow::anyhow!("analysis task aborted: {}", e))??;

    if !result.success {
        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        tracing::error!("Synchronous analysis for {} failed: {}", params.ticker, reason);
        return Err(AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("Analysis failed: {}", reason),
        ));
    }

    Ok(Json(SyncResponse {
        success: true,
        message: format!("Analysis for {} completed", params.ticker),
        result,
    }))
}

fn task_not_found(task_id: &str) -> AppError {
    AppError::with_status(
        StatusCode::NOT_FOUND,
        anyhow::anyhow!("Task {} not found", task_id),
    )
}
