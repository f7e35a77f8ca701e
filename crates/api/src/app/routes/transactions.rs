//! Transaction service surface. Every route runs as the caller in
//! [`PrincipalContext`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use ledgerflow_core::{AccountId, TransactionId};
use ledgerflow_transactions::CreateTransaction;

use super::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/transactions/:id", get(get_transaction))
        .route("/transactions/account/:account_id", get(list_account_transactions))
}

pub async fn create_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateTransaction>,
) -> Response {
    let principal = principal.principal_id();

    match blocking(services, move |s| s.orchestrator().create(&body, principal)).await {
        Ok(Ok(record)) => {
            (StatusCode::CREATED, Json(dto::TransactionResponse::from(&record))).into_response()
        }
        Ok(Err(e)) => errors::transaction_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<TransactionId>,
) -> Response {
    let principal = principal.principal_id();

    match blocking(services, move |s| s.orchestrator().get(id, principal)).await {
        Ok(Ok(record)) => (StatusCode::OK, Json(dto::TransactionResponse::from(&record))).into_response(),
        Ok(Err(e)) => errors::transaction_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_account_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(account_id): Path<AccountId>,
) -> Response {
    let principal = principal.principal_id();

    match blocking(services, move |s| s.orchestrator().list(account_id, principal)).await {
        Ok(Ok(records)) => {
            let items = records.iter().map(dto::TransactionResponse::from).collect();
            (StatusCode::OK, Json(dto::ItemsResponse { items })).into_response()
        }
        Ok(Err(e)) => errors::transaction_error_to_response(e),
        Err(resp) => resp,
    }
}
