use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledgerflow_core::ValidationUnavailable;
use ledgerflow_ledger::LedgerError;
use ledgerflow_transactions::TransactionError;

pub fn transaction_error_to_response(err: TransactionError) -> axum::response::Response {
    match err {
        TransactionError::Unauthorized { .. } => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", err.to_string())
        }
        TransactionError::InsufficientFunds(_) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_funds",
            err.to_string(),
        ),
        TransactionError::InvalidDestination(_) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_destination",
            err.to_string(),
        ),
        TransactionError::ValidationUnavailable(inner) => validation_unavailable_to_response(inner),
        TransactionError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        TransactionError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        TransactionError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        TransactionError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        TransactionError::PublishFailure { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "publish_error", err.to_string())
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        LedgerError::AlreadyExists(_) | LedgerError::Conflict(_) | LedgerError::LegAlreadyApplied(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        LedgerError::InsufficientFunds { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_funds",
            err.to_string(),
        ),
        LedgerError::BalanceLimit { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "balance_limit",
            err.to_string(),
        ),
        LedgerError::CurrencyMismatch { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "currency_mismatch",
            err.to_string(),
        ),
        LedgerError::Domain(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        LedgerError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn validation_unavailable_to_response(err: ValidationUnavailable) -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "validation_unavailable",
        err.to_string(),
    )
}

/// A blocking task panicked or was cancelled.
pub fn join_error_to_response(err: tokio::task::JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "blocking task failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "request aborted")
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
