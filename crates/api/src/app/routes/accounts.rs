//! Account service surface: management plus the validation endpoints the
//! transaction service calls.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;

use ledgerflow_core::{AccountId, Amount, Currency, PrincipalId, TransactionId, Validator};
use ledgerflow_ledger::LedgerError;

use super::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/validate", get(check_ownership))
        .route("/accounts/:id/checksum", get(check_funds))
        .route("/accounts/:id/accepts", get(check_compatible))
        .route("/accounts/:id/holds", post(place_hold))
        .route("/accounts/:id/holds/:transaction_id", delete(release_hold))
        .route("/accounts/user/:owner_id", get(list_owner_accounts))
}

pub async fn create_account(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateAccountRequest>,
) -> Response {
    let currency = match Currency::new(body.currency) {
        Ok(c) => c,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    let result = blocking(services, move |s| {
        s.ledger()
            .open_account(body.owner_id, body.initial_balance, currency)
    })
    .await;

    match result {
        Ok(Ok(account)) => (StatusCode::CREATED, Json(dto::AccountResponse::from(&account))).into_response(),
        Ok(Err(e)) => errors::ledger_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<AccountId>,
) -> Response {
    match blocking(services, move |s| s.ledger().account(id)).await {
        Ok(Ok(account)) => (StatusCode::OK, Json(dto::AccountResponse::from(&account))).into_response(),
        Ok(Err(e)) => errors::ledger_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_owner_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(owner_id): Path<PrincipalId>,
) -> Response {
    match blocking(services, move |s| s.ledger().accounts_for_owner(owner_id)).await {
        Ok(Ok(accounts)) => {
            let items = accounts.iter().map(dto::AccountResponse::from).collect();
            (StatusCode::OK, Json(dto::ItemsResponse { items })).into_response()
        }
        Ok(Err(e)) => errors::ledger_error_to_response(e),
        Err(resp) => resp,
    }
}

/// `true` iff `userId` owns the account. Unknown accounts answer `false`.
pub async fn check_ownership(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<AccountId>,
    Query(query): Query<dto::OwnershipQuery>,
) -> Response {
    match blocking(services, move |s| s.accounts().check_ownership(id, query.user_id)).await {
        Ok(Ok(owned)) => Json(owned).into_response(),
        Ok(Err(e)) => errors::validation_unavailable_to_response(e),
        Err(resp) => resp,
    }
}

/// `true` iff available funds cover `sum`. Changes nothing.
pub async fn check_funds(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<AccountId>,
    Query(query): Query<dto::FundsQuery>,
) -> Response {
    let amount = match Amount::new(query.sum) {
        Ok(a) => a,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    let result = blocking(services, move |s| match s.ledger().account(id) {
        Ok(account) => Ok(account.available(Utc::now()) >= amount.value()),
        Err(LedgerError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    })
    .await;

    match result {
        Ok(Ok(covered)) => Json(covered).into_response(),
        Ok(Err(e)) => errors::ledger_error_to_response(e),
        Err(resp) => resp,
    }
}

/// `true` iff available funds cover `sum`, in which case they are held for
/// `transactionId`. Repeating a passing request holds nothing extra.
pub async fn place_hold(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<AccountId>,
    Json(body): Json<dto::PlaceHoldRequest>,
) -> Response {
    let amount = match Amount::new(body.sum) {
        Ok(a) => a,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match blocking(services, move |s| s.accounts().check_funds(id, amount, body.transaction_id)).await {
        Ok(Ok(covered)) => Json(covered).into_response(),
        Ok(Err(e)) => errors::validation_unavailable_to_response(e),
        Err(resp) => resp,
    }
}

/// `true` iff the account exists and shares the currency of `from`.
pub async fn check_compatible(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<AccountId>,
    Query(query): Query<dto::CompatibilityQuery>,
) -> Response {
    match blocking(services, move |s| s.accounts().check_compatible(query.from, id)).await {
        Ok(Ok(compatible)) => Json(compatible).into_response(),
        Ok(Err(e)) => errors::validation_unavailable_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn release_hold(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, transaction_id)): Path<(AccountId, TransactionId)>,
) -> Response {
    match blocking(services, move |s| s.accounts().release_hold(id, transaction_id)).await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => errors::validation_unavailable_to_response(e),
        Err(resp) => resp,
    }
}
