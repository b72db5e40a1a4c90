use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use factoryerp_core::AggregateId;
use factoryerp_infra::receiving::ReceivingError;

pub fn receiving_error_to_response(err: ReceivingError) -> axum::response::Response {
    match err {
        ReceivingError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ReceivingError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ReceivingError::InvalidState(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_state", msg)
        }
        ReceivingError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ReceivingError::Posting(e) => {
            tracing::error!(material_id = %e.material(), error = %e, "stock posting failed");
            json_error(StatusCode::BAD_GATEWAY, "posting_failed", e.to_string())
        }
        ReceivingError::Infrastructure(msg) => {
            tracing::error!(error = %msg, "infrastructure failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error", msg)
        }
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

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    raw.trim().parse::<AggregateId>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what}"),
        )
    })
}
