use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use critica_core::DomainError;
use critica_infra::{AuthFlowError, CatalogError, StoreError};

pub fn auth_flow_error_to_response(err: AuthFlowError) -> axum::response::Response {
    match err {
        AuthFlowError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AuthFlowError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
        AuthFlowError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        AuthFlowError::InvalidCredentials(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_credentials", msg)
        }
        AuthFlowError::Delivery(e) => json_error(StatusCode::BAD_GATEWAY, "delivery_error", e.to_string()),
        AuthFlowError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        AuthFlowError::Token(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", e.to_string()),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        StoreError::Backend(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match err {
        CatalogError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        CatalogError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CatalogError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
        CatalogError::Backend(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
    }
}

/// Malformed or incomplete JSON bodies are validation errors.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

/// Record ids that do not even parse cannot name an existing record.
pub fn path_rejection_to_response(rejection: PathRejection) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", rejection.body_text())
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
