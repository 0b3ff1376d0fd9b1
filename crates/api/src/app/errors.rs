use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_infra::{CatalogError, ErrorCategory, LedgerError};
use stockroom_infra::audit::AuditStoreError;
use stockroom_infra::stock_store::StockStoreError;

const SERVER_ERROR: &str = "Server Error";

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

/// Movement failures. Business rejections surface as `400`, like malformed input.
pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match &err {
        LedgerError::InsufficientStock { available, .. } => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": err.to_string(),
                "available": available,
            })),
        )
            .into_response(),
        LedgerError::NegativeStockAdjustment { .. } => {
            json_error(StatusCode::BAD_REQUEST, "negative_stock", err.to_string())
        }
        _ => category_response(err.category(), &err),
    }
}

/// Product writes. A duplicate code or a still-referenced product is a `409`.
pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match &err {
        CatalogError::Store(StockStoreError::Conflict(_)) => {
            json_error(StatusCode::CONFLICT, "conflict", "Product code already exists.")
        }
        CatalogError::Store(StockStoreError::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "Product not found.")
        }
        CatalogError::Store(StockStoreError::Constraint(_)) => json_error(
            StatusCode::CONFLICT,
            "constraint_violation",
            "Product has stock transactions and cannot be deleted.",
        ),
        _ => category_response(err.category(), &err),
    }
}

pub fn store_error_to_response(err: StockStoreError) -> axum::response::Response {
    category_response(err.category(), &err)
}

pub fn audit_error_to_response(err: AuditStoreError) -> axum::response::Response {
    tracing::error!(error = %err, "audit log read failed");
    match err {
        AuditStoreError::Unavailable(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "audit_unavailable",
            "Audit log is temporarily unavailable.",
        ),
        AuditStoreError::Backend(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", SERVER_ERROR)
        }
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn not_found(message: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn category_response(category: ErrorCategory, err: &dyn std::error::Error) -> axum::response::Response {
    match category {
        ErrorCategory::Validation => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        ErrorCategory::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ErrorCategory::Conflict => json_error(StatusCode::BAD_REQUEST, "conflict", err.to_string()),
        ErrorCategory::Constraint => {
            json_error(StatusCode::CONFLICT, "constraint_violation", err.to_string())
        }
        ErrorCategory::Infrastructure => {
            tracing::error!(error = %err, "request failed on infrastructure error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", SERVER_ERROR)
        }
    }
}
