use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use ledgerflow_core::PrincipalId;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Header carrying the already-verified caller identity.
pub const PRINCIPAL_HEADER: &str = "x-principal-id";

pub async fn principal_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = extract_principal(req.headers())?;

    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

fn extract_principal(headers: &HeaderMap) -> Result<PrincipalId, Response> {
    let missing = || {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            format!("{PRINCIPAL_HEADER} header required"),
        )
    };

    let header = headers.get(PRINCIPAL_HEADER).ok_or_else(missing)?;
    let header = header.to_str().map_err(|_| missing())?.trim();
    if header.is_empty() {
        return Err(missing());
    }

    header.parse().map_err(|e: ledgerflow_core::DomainError| {
        json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string())
    })
}
