//! HTTP API: account and transaction surfaces over the ledgerflow services.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
