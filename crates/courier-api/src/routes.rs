//! API routes for Courier endpoints

use axum::response::sse as ax_sse;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use utoipa::OpenApi;
use uuid::Uuid;

use courier_queue::{
    parse_job_id, Admission, JobId, JobStatus, JobStatusView, SendRequest, StatusService,
};

use crate::error::{ApiError, ApiResult, ErrorBody, ErrorResponse};
use crate::state::AppState;

/// Interval between pushes on a job's event stream
pub const STREAM_INTERVAL: Duration = Duration::from_secs(1);

/// Health check response
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentHealth>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ComponentHealth {
    pub jobs: JobCounts,
    pub dispatch: DispatchHealth,
}

/// Stored jobs per status
#[derive(Debug, Default, Serialize, utoipa::ToSchema)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchHealth {
    pub transport: String,
    pub max_in_flight: usize,
    pub available_permits: usize,
}

/// Basic health check handler (lightweight)
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Basic health check", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        components: None,
    })
}

/// Health check with job counts and dispatch capacity
#[utoipa::path(
    get,
    path = "/health/detailed",
    responses(
        (status = 200, description = "Health check with component status", body = HealthResponse)
    )
)]
pub async fn health_detailed(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, jobs) = match state.store().count_by_status().await {
        Ok(counts) => {
            let count = |s: JobStatus| counts.get(&s).copied().unwrap_or(0);
            let jobs = JobCounts {
                pending: count(JobStatus::Pending),
                processing: count(JobStatus::Processing),
                completed: count(JobStatus::Completed),
                failed: count(JobStatus::Failed),
            };
            ("healthy", jobs)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            ("degraded", JobCounts::default())
        }
    };

    let pool = state.pool();
    let dispatch = DispatchHealth {
        transport: pool.transport().name().to_string(),
        max_in_flight: pool.config().max_in_flight,
        available_permits: pool.available_permits(),
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        components: Some(ComponentHealth { jobs, dispatch }),
    })
}

/// Send request as posted by the web client
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub from: String,
    /// Each entry may hold several addresses separated by `,`, `;` or spaces
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, alias = "optionalResumeRef")]
    pub tailored_resume_id: Option<String>,
}

impl From<SendEmailRequest> for SendRequest {
    fn from(req: SendEmailRequest) -> Self {
        SendRequest {
            from: req.from,
            to: req.to,
            subject: req.subject,
            body: req.body,
            attachment_ref: req.tailored_resume_id,
        }
    }
}

/// Reply for a message sent inline
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentResponse {
    pub status: String,
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

/// Reply for a bulk send accepted as a background job
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_recipients: u32,
    pub message: String,
}

/// Send one message, inline or as a background job
#[utoipa::path(
    post,
    path = "/api/send-email",
    request_body = SendEmailRequest,
    responses(
        (status = 200, description = "Sent inline", body = SentResponse),
        (status = 202, description = "Accepted as a background job", body = JobAccepted),
        (status = 400, description = "Missing JSON content type", body = ErrorResponse),
        (status = 422, description = "Malformed payload, invalid sender or recipients", body = ErrorResponse),
        (status = 502, description = "Transport rejected the message", body = ErrorResponse),
        (status = 503, description = "Transport unavailable", body = ErrorResponse),
        (status = 504, description = "Transport timed out", body = ErrorResponse)
    )
)]
pub async fn send_email(
    State(state): State<AppState>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    match state.admission().admit(req.into()).await? {
        Admission::Sent(receipt) => {
            let body = SentResponse {
                status: "SENT".to_string(),
                recipients: receipt.recipients,
                message_id: receipt.delivery.message_id,
                accepted_at: receipt.delivery.accepted_at,
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Admission::Queued(queued) => {
            let body = JobAccepted {
                job_id: queued.job.id,
                status: queued.job.status(),
                total_recipients: queued.job.total_recipients,
                message: queued.message(),
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
    }
}

fn job_id_from_path(raw: &str) -> ApiResult<JobId> {
    parse_job_id(raw).ok_or_else(|| ApiError::NotFound(format!("Job {} not found", raw)))
}

/// Poll a bulk job
#[utoipa::path(
    get,
    path = "/api/send-email/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID returned when the bulk send was accepted")
    ),
    responses(
        (status = 200, description = "Current job progress", body = JobStatusView),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let id = job_id_from_path(&job_id)?;
    let view = state.status().status(id).await?;
    Ok(Json(view))
}

/// SSE Stream handler for job progress
#[utoipa::path(
    get,
    path = "/api/send-email/jobs/{job_id}/stream",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "SSE stream of status views, ending at a terminal status"),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
pub async fn get_job_stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<ax_sse::Sse<impl Stream<Item = Result<ax_sse::Event, Infallible>>>> {
    let id = job_id_from_path(&job_id)?;
    // reject unknown ids up front rather than opening an empty stream
    state.status().status(id).await?;

    let stream = stream::unfold(
        (state.status().clone(), id, false),
        |(status, id, finished): (StatusService, JobId, bool)| async move {
            if finished {
                return None;
            }

            match status.status(id).await {
                Ok(view) => {
                    let is_final = view.is_terminal();
                    let event = ax_sse::Event::default()
                        .event("status")
                        .json_data(&view)
                        .unwrap_or_else(|_| ax_sse::Event::default().event("error").data("encode_failed"));

                    if !is_final {
                        tokio::time::sleep(STREAM_INTERVAL).await;
                    }

                    Some((Ok(event), (status, id, is_final)))
                }
                Err(_) => {
                    // evicted while streaming
                    let event = ax_sse::Event::default().event("error").data("job_not_found");
                    Some((Ok(event), (status, id, true)))
                }
            }
        },
    );

    Ok(ax_sse::Sse::new(stream).keep_alive(ax_sse::KeepAlive::default()))
}

/// OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Courier", description = "Bulk mail dispatch with pollable job progress"),
    paths(
        health,
        health_detailed,
        send_email,
        get_job_status,
        get_job_stream,
    ),
    components(
        schemas(
            HealthResponse, ComponentHealth, JobCounts, DispatchHealth,
            SendEmailRequest, SentResponse, JobAccepted,
            JobStatusView, JobStatus,
            ErrorResponse, ErrorBody,
        )
    )
)]
pub struct ApiDoc;

/// Build the API router
pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Documentation
        .route("/api-docs/openapi.json", get(openapi_json))
        // Public endpoints
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        // Mail endpoints
        .route("/api/send-email", post(send_email))
        .route("/api/send-email/jobs/{job_id}", get(get_job_status))
        .route("/api/send-email/jobs/{job_id}/stream", get(get_job_stream))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_both_resume_field_names() {
        let req: SendEmailRequest = serde_json::from_value(serde_json::json!({
            "from": "me@example.com",
            "to": ["a@example.com"],
            "subject": "Hi",
            "body": "Hello",
            "tailoredResumeId": "r-1"
        }))
        .unwrap();
        assert_eq!(req.tailored_resume_id.as_deref(), Some("r-1"));

        let req: SendEmailRequest = serde_json::from_value(serde_json::json!({
            "from": "me@example.com",
            "to": ["a@example.com"],
            "subject": "Hi",
            "optionalResumeRef": "r-2"
        }))
        .unwrap();
        assert_eq!(req.tailored_resume_id.as_deref(), Some("r-2"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_openapi_lists_mail_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/send-email"));
        assert!(doc.paths.paths.contains_key("/api/send-email/jobs/{job_id}"));
    }
}
