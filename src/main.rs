use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use camo::{api, Config, Engine};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        port = config.port,
        max_sessions = config.max_sessions,
        session_ttl = ?config.session_ttl,
        "starting camo proxy service"
    );

    let engine = Arc::new(Engine::new(config));
    let router = api::router(engine);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    tracing::info!("service stopped");
    Ok(())
}
