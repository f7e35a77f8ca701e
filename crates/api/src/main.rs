use std::sync::Arc;

use anyhow::Context;

use ledgerflow_api::app::{build_app, services};
use ledgerflow_api::config::Config;

// Services are built and dropped outside the runtime: the HTTP validator
// owns a blocking client and the Postgres stores block on the runtime handle.
fn main() -> anyhow::Result<()> {
    ledgerflow_observability::init();

    let config = Config::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let (services, worker) = services::build_services(&config, runtime.handle())?;
    let services = Arc::new(services);
    let app = build_app(services.clone());

    let served = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_addr))?;

        tracing::info!(addr = %listener.local_addr()?, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")
    });

    worker.shutdown();
    drop(services);
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
