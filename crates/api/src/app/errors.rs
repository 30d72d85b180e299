//! Maps service errors onto status codes and the response envelope.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use kiosk_core::DomainError;
use kiosk_infra::store::StoreError;
use kiosk_infra::{CatalogError, StatisticsError, WorkflowError};

use crate::app::dto::ApiResponse;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    ApiResponse::<()>::of(status, message, None).into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, message)
}

/// Malformed or mistyped JSON bodies.
pub fn rejection_to_response(rejection: JsonRejection) -> Response {
    bad_request(rejection.body_text())
}

pub fn workflow_error_to_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::InsufficientStock(short) => json_error(StatusCode::CONFLICT, short.to_string()),
        WorkflowError::InvalidOrder(err) => domain_error_to_response(err),
        WorkflowError::Persistence { source, .. } => store_error_to_response(source),
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> Response {
    match err {
        CatalogError::Domain(err) => domain_error_to_response(err),
        CatalogError::Store(err) => store_error_to_response(err),
    }
}

pub fn statistics_error_to_response(err: StatisticsError) -> Response {
    match err {
        StatisticsError::Store(err) => store_error_to_response(err),
        StatisticsError::Domain(err) => {
            error!(error = %err, "revenue could not be computed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        err @ StatisticsError::NotificationDelivery { .. } => {
            json_error(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    json_error(StatusCode::BAD_REQUEST, err.to_string())
}

fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::InsufficientStock(short) => json_error(StatusCode::CONFLICT, short.to_string()),
        StoreError::Conflict(_) => json_error(StatusCode::CONFLICT, err.to_string()),
        err => {
            error!(error = %err, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
        }
    }
}
