use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use longrun_core::TaskError;
use longrun_infra::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("task not found: {id}"))
        }
        StoreError::AlreadyExists(id) => json_error(
            StatusCode::CONFLICT,
            "already_exists",
            format!("task already exists: {id}"),
        ),
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn domain_error_to_response(err: TaskError) -> axum::response::Response {
    match err {
        TaskError::IllegalTransition { from, to } => json_error(
            StatusCode::CONFLICT,
            "illegal_transition",
            format!("illegal transition: {from} -> {to}"),
        ),
        TaskError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        TaskError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        TaskError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "task not found"),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
