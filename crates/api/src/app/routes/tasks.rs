//! Task submission, status, cancellation, consumption and cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use longrun_core::{TaskId, TaskStatus};
use longrun_infra::sweeper::DEFAULT_ORPHAN_AGE;
use longrun_infra::{consume, sweep, SweepMode, TaskPatch};

use crate::app::dto::{CleanupQuery, StatusResponse, SubmitTaskRequest, SubmitTaskResponse};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            post(submit_task).delete(cleanup_tasks).get(missing_task_id),
        )
        .route("/:id", get(get_task_status))
        .route("/:id/cancel", post(cancel_task))
        .route("/:id/consume", post(consume_task))
}

/// GET /tasks without an id is a validation error, not a listing.
async fn missing_task_id() -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "task id is required")
}

/// POST /tasks
///
/// Validates the submission, persists the record in `queued` and spawns the
/// executor fire-and-forget. Responds 202 before any work has run.
pub async fn submit_task(
    Extension(services): Extension<Arc<AppServices>>,
    Json(request): Json<SubmitTaskRequest>,
) -> axum::response::Response {
    if request.task_type.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "type must not be empty",
        );
    }
    if !services.registry.supports(&request.task_type) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "unsupported_task_type",
                "message": format!("unsupported task type: {}", request.task_type),
                "supported_types": services.registry.supported_types(),
            })),
        )
            .into_response();
    }

    let task = request.into_task();
    let estimate = services.estimate_for(&task);
    let response = SubmitTaskResponse::accepted(&task, estimate);

    let id = match services.store.create(task).await {
        Ok(id) => id,
        Err(e) => return errors::store_error_to_response(e),
    };
    services.dispatch(id);

    tracing::info!(task_id = %id, "task accepted");
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// GET /tasks/:id
///
/// Pure read; unknown ids answer 404 so clients can distinguish a swept
/// record from one that has made no progress yet.
pub async fn get_task_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<TaskId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.get(id).await {
        Ok(task) => (StatusCode::OK, Json(StatusResponse::from(task))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /tasks/:id/cancel
///
/// Marks the task `cancelled`. The executor observes the flag at its next
/// step boundary; a terminal task answers 409.
pub async fn cancel_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<TaskId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .store
        .update(id, TaskPatch::transition(TaskStatus::Cancelled))
        .await
    {
        Ok(task) => {
            tracing::info!(task_id = %id, "task cancelled");
            (StatusCode::OK, Json(StatusResponse::from(task))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /tasks/:id/consume
///
/// Acknowledges a completed result (`completed -> consumed`). Under
/// `cleanup=immediate` the payloads are dropped in the same call.
pub async fn consume_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<TaskId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match consume(services.store.as_ref(), id).await {
        Ok(task) => (StatusCode::OK, Json(StatusResponse::from(task))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// DELETE /tasks?mode=all|orphaned|pattern
///
/// Retention sweep. `dry_run=true` reports candidates without deleting.
pub async fn cleanup_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<CleanupQuery>,
) -> axum::response::Response {
    let mode = match query.mode.as_deref().unwrap_or("orphaned") {
        "all" => SweepMode::All { kind: query.pattern },
        "orphaned" => {
            let age = query
                .max_age_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ORPHAN_AGE);
            SweepMode::OrphanedOlderThan(age)
        }
        mode @ ("pattern" | "matching") => match query.pattern {
            Some(pattern) => SweepMode::Matching(pattern),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    format!("mode={mode} requires a pattern"),
                );
            }
        },
        other => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_mode",
                format!("unknown cleanup mode: {other}"),
            );
        }
    };

    let dry_run = query.dry_run.unwrap_or(false);
    match sweep(services.store.as_ref(), mode, dry_run).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
