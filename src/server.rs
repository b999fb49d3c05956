//! HTTP surface over [`JobOrchestrator`].
//!
//! Blocking work (opening repositories, rendering previews) runs on the blocking pool; job
//! execution itself never touches the async runtime.

use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::encode::ffmpeg::OutputFormat;
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::jobs::model::{JobRequest, JobView};
use crate::jobs::orchestrator::JobOrchestrator;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Deserialize)]
struct BranchesRequest {
    #[serde(default)]
    repo_path: String,
}

/// A domain error rendered as `{"error": ...}` with a matching status code.
pub struct ApiError(pub ChronoError);

impl From<ChronoError> for ApiError {
    fn from(e: ChronoError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ChronoError::InvalidOption(_)
            | ChronoError::Repository(_)
            | ChronoError::BranchNotFound(_)
            | ChronoError::EmptyHistory(_) => StatusCode::BAD_REQUEST,
            ChronoError::NotFound(_) => StatusCode::NOT_FOUND,
            ChronoError::NotReady(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(orchestrator: JobOrchestrator) -> Router {
    Router::new()
        .route("/", get(handle_info))
        .route("/api/branches", post(api_branches))
        .route("/api/generate", post(api_generate))
        .route("/api/status/:id", get(api_status))
        .route("/api/download/:id", get(api_download))
        .route("/api/jobs", get(api_jobs))
        .route("/api/preview", post(api_preview))
        .with_state(orchestrator)
}

/// Bind and serve until Ctrl-C. Expired artifacts are pruned in the background when the
/// orchestrator has a retention window.
pub async fn serve(orchestrator: JobOrchestrator, host: &str, port: u16) -> anyhow::Result<()> {
    if let Some(retention) = orchestrator.config().retention {
        tokio::spawn(prune_loop(orchestrator.clone(), prune_period(retention)));
    }

    let app = router(orchestrator);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("chronoscope listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

fn prune_period(retention: Duration) -> Duration {
    (retention / 2).clamp(Duration::from_secs(1), Duration::from_secs(300))
}

async fn prune_loop(orchestrator: JobOrchestrator, period: Duration) {
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        let orch = orchestrator.clone();
        match tokio::task::spawn_blocking(move || orch.prune_expired()).await {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "pruned expired artifacts"),
            Err(e) => tracing::warn!("prune task failed: {e}"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> ChronoResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(ChronoError::Other(anyhow::anyhow!("worker task failed: {e}"))))?
        .map_err(ApiError)
}

fn require_repo_path(path: &str) -> Result<(), ApiError> {
    if path.trim().is_empty() {
        return Err(ApiError(ChronoError::invalid_option(
            "Invalid repository path",
        )));
    }
    Ok(())
}

/// GET / - service info
async fn handle_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "chronoscope",
        "version": env!("CARGO_PKG_VERSION"),
        "formats": [OutputFormat::Mp4, OutputFormat::Gif],
        "resolutions": ["720p", "1080p", "4k", "custom"],
    }))
}

/// POST /api/branches - local branches of a repository
async fn api_branches(
    State(orch): State<JobOrchestrator>,
    Json(req): Json<BranchesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_repo_path(&req.repo_path)?;
    let branches = blocking(move || orch.list_branches(&req.repo_path)).await?;
    Ok(Json(serde_json::json!({ "branches": branches })))
}

/// POST /api/generate - submit a job
async fn api_generate(
    State(orch): State<JobOrchestrator>,
    Json(req): Json<JobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_repo_path(&req.repo_path)?;
    let options = req.to_options()?;
    let job_id = blocking(move || orch.submit(&req.repo_path, options)).await?;
    Ok(Json(serde_json::json!({ "job_id": job_id })))
}

/// GET /api/status/:id
async fn api_status(
    State(orch): State<JobOrchestrator>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(orch.query(&id)?))
}

/// GET /api/download/:id - artifact as an attachment
async fn api_download(
    State(orch): State<JobOrchestrator>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let path = orch.fetch_result(&id)?;
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        ApiError(ChronoError::not_found(format!(
            "output of job '{id}' could not be read: {e}"
        )))
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError(ChronoError::Other(anyhow::anyhow!("stat '{}': {e}", path.display()))))?
        .len();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("timelapse_{id}"));
    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse::<OutputFormat>().ok())
        .map_or("application/octet-stream", OutputFormat::mime_type);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_owned()),
            (header::CONTENT_LENGTH, len.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// GET /api/jobs - every known job
async fn api_jobs(State(orch): State<JobOrchestrator>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "jobs": orch.list_jobs() }))
}

/// POST /api/preview - PNG of the newest commit
async fn api_preview(
    State(orch): State<JobOrchestrator>,
    Json(req): Json<JobRequest>,
) -> Result<Response, ApiError> {
    require_repo_path(&req.repo_path)?;
    let options = req.to_options()?;
    let preview = blocking(move || orch.preview(&req.repo_path, &options)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_owned()),
            (
                header::HeaderName::from_static("x-chronoscope-commit"),
                preview.commit.hash,
            ),
        ],
        preview.png,
    )
        .into_response())
}
