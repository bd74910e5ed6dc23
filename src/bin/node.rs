//! Storage node binary.
//!
//! Binds the node wire contract on one port and serves until interrupted.
//! All state is in memory; a restart starts empty.

use std::sync::Arc;

use tracing::info;

use stripestore::config;
use stripestore::node::handlers::router;
use stripestore::node::memory::NodeStore;
use stripestore::shutdown::Shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("starts");

    let port = detect_port();
    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let store = Arc::new(NodeStore::new());
    let app = router(store);

    let addr = config::listen_addr(&config::expand_env(&port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("node server {} starts", addr);

    let graceful = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await?;

    info!("node server {} closed", addr);
    info!("shutting down complete");
    Ok(())
}

/// Port resolution: the NODEPORT environment variable, then the -p
/// argument, then the default.
fn detect_port() -> String {
    let mut port: Option<String> = None;
    if let Ok(env_port) = std::env::var("NODEPORT") {
        if !env_port.is_empty() {
            port = Some(env_port);
        }
    }
    if port.is_none() {
        let args: Vec<String> = std::env::args().collect();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-p" | "--port" if i + 1 < args.len() => {
                    port = Some(args[i + 1].clone());
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }
    }
    let mut port = match port {
        Some(p) => p,
        None => {
            info!("used default port :50051");
            ":50051".to_string()
        }
    };
    if !port.contains(':') {
        port = format!(":{}", port);
    }
    port
}
