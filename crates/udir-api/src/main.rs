//! udir API server

use std::future::Future;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use udir_api::{create_router, state::AppState};
use udir_core::{AppConfig, InMemoryDirectory, LogEventSink, LogRecoveryNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("UDIR_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config);

    if config.auth.uses_development_secret() {
        tracing::warn!("JWT_SECRET is not set; signing with the development secret");
    }

    // The HTTP boundary ships with the in-memory gateway; persistent
    // directories plug in through `UserDirectory`.
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(LogEventSink),
    )?
    .with_notifier(Arc::new(LogRecoveryNotifier)));

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("udir API server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "udir_api={level},udir_core={level},audit=info,events=info,notifications=info,tower_http=debug",
            level = config.logging.level
        ))
    });

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// Resolve once `signal` fires; a listener that fails to install never resolves
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
