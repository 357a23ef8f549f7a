//! riskgate server
//!
//! - POST /v1/transactions/evaluate behind admission control
//! - rule administration under /v1/admission
//! - Ctrl-C marks the gateway draining, then stops accepting

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use riskgate_gateway::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var("RISKGATE_CONFIG").unwrap_or_else(|_| "riskgate.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .expect("server.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg).expect("app state init failed");
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config=%path, "riskgate starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await
        .expect("server failed");
}

async fn shutdown(state: app_state::AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error=%e, "failed to listen for ctrl-c");
        return;
    }
    state.set_draining();
    tracing::info!("shutdown signal received, draining");
}
