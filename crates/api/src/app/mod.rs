//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter selection and background mutator
//! - `routes/`: HTTP routes + handlers (accounts, transactions)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Transaction routes require the `x-principal-id` header; the account
/// service surface is service-to-service and does not.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let transactions = routes::transactions::router().layer(axum::middleware::from_fn(
        middleware::principal_middleware,
    ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(routes::accounts::router())
        .merge(transactions)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
