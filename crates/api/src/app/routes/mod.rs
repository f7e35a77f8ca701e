use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;

use crate::app::errors;
use crate::app::services::AppServices;

pub mod accounts;
pub mod transactions;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Run `f` on the blocking pool. Stores, validators and the bus are all
/// synchronous.
pub(crate) async fn blocking<T, F>(services: Arc<AppServices>, f: F) -> Result<T, Response>
where
    F: FnOnce(&AppServices) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&services))
        .await
        .map_err(errors::join_error_to_response)
}
