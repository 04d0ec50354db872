use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockroom_auth::AuthzError;
use stockroom_core::DomainError;
use stockroom_infra::StoreError;
use stockroom_infra::export::ExportError;

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "store unavailable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage is unavailable")
        }
        StoreError::Corrupt(msg) => {
            tracing::error!(error = %msg, "corrupt stored data");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "stored data could not be read")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InsufficientStock { requested, available } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("insufficient stock: requested {requested}, available {available}"),
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid credentials"),
        DomainError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "invariant violation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", msg)
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn export_error_to_response(err: ExportError) -> Response {
    tracing::error!(error = %err, "export failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "export_error", "export failed")
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::insufficient_stock(8, 7), StatusCode::CONFLICT),
            (DomainError::conflict("dup"), StatusCode::CONFLICT),
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::Unauthorized, StatusCode::UNAUTHORIZED),
            (DomainError::invariant("broken"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn infrastructure_errors_are_500() {
        let resp = store_error_to_response(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
