//! Axum API server binary.

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vlog_api::{create_router, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vlog=info,vlog_api=info")),
        )
        .init();

    info!("Starting vlog-api");

    let config = ApiConfig::from_env();
    info!(host = %config.host, port = config.port, "API config loaded");

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        eprintln!("Failed to create output dir {}: {e}", config.output_dir.display());
        std::process::exit(1);
    }
    if let Err(e) = std::fs::create_dir_all(&config.session_root) {
        eprintln!("Failed to create session root {}: {e}", config.session_root.display());
        std::process::exit(1);
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    let state = AppState::new(config);
    let app = create_router(state);

    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
