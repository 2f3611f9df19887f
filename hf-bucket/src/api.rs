//! Admission HTTP API.
//!
//! `POST /` with `{"hf_url": "...", "r2_path": "..."}` admits one transfer job:
//! 200 with the job id when queued, 400 for invalid input, 500 when the queue refuses the job.
//! Any other method on `/` gets 405.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use hf_bucket_core::contract::JobQueue;
use hf_bucket_core::job::JobStatus;
use hf_bucket_core::producer::{AdmissionError, JobProducer};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const METHOD_NOT_ALLOWED: &str = "Method not allowed. Use POST.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdmissionBody {
    hf_url: Option<String>,
    r2_path: Option<String>,
}

pub fn build_router<Q>(producer: Arc<JobProducer<Q>>) -> Router
where
    Q: JobQueue + 'static,
{
    Router::new()
        .route("/", post(admit::<Q>).fallback(method_not_allowed))
        .route("/health", get(health))
        .with_state(producer)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "[API] Listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn admit<Q: JobQueue + 'static>(
    State(producer): State<Arc<JobProducer<Q>>>,
    body: Bytes,
) -> Response {
    let request: AdmissionBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "[API] Rejected malformed JSON body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
    };
    let source_url = request.hf_url.unwrap_or_default();
    let destination_path = request.r2_path.unwrap_or_default();

    match producer.admit(&source_url, &destination_path).await {
        Ok(job) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("Transfer job queued: {} → R2://{}", job.source_url, job.destination_path),
                "job_id": job.job_id,
                "status": JobStatus::Queued,
            })),
        )
            .into_response(),
        Err(e @ (AdmissionError::MissingField | AdmissionError::InvalidSource)) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e @ AdmissionError::Enqueue(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}
