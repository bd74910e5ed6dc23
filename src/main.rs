//! Front coordinator binary.
//!
//! Startup order matters: configuration, the shutdown signal, the node
//! dials behind the startup barrier, and only then the HTTP listeners. If
//! the signal fires while the fleet is still connecting, the listeners are
//! never opened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use stripestore::api;
use stripestore::cluster::service::Cluster;
use stripestore::config::{self, Config};
use stripestore::shutdown::Shutdown;
use stripestore::storage::memory::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("starts");

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 >= args.len() {
                    eprintln!("Usage: {} [-c <config-dir>]", args[0]);
                    std::process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let cfg = match Config::load(config_path.as_deref()) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    info!("expects {} nodes", cfg.node_list.len());

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let storage = Arc::new(Storage::with_nodes(&cfg.node_list));
    let cluster = Cluster::new(storage.clone(), shutdown.clone());

    // wait until every node is connected or shutdown has begun
    cluster.connect_all().await;
    if shutdown.is_triggered() {
        cluster.drain().await;
        info!("shutting down complete");
        return Ok(());
    }

    let app = api::router(storage, cluster.clone(), cfg.clone(), shutdown.clone());

    let mut listeners = Vec::new();
    for port in &cfg.webserver.port_http {
        let addr = config::listen_addr(&config::expand_env(port));
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to listen on {}: {}", addr, e))?;
        info!("start http on {}", addr);
        listeners.push(tokio::spawn(serve(
            listener,
            app.clone(),
            shutdown.clone(),
            cfg.webserver.shutdown_timeout,
        )));
    }
    info!("service ready");

    // drain every long-lived task before the process exits
    for handle in listeners {
        handle.await?;
    }
    cluster.drain().await;
    info!("shutting down complete");
    Ok(())
}

/// Serves one listener until the shutdown signal; the graceful drain of
/// in-flight connections is bounded by the configured timeout.
async fn serve(listener: TcpListener, app: Router, shutdown: Shutdown, timeout: Duration) {
    let graceful = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
    };
    tokio::select! {
        served = server => {
            if let Err(e) = served {
                error!("failed to serve: {}", e);
            }
        }
        _ = async { shutdown.cancelled().await; tokio::time::sleep(timeout).await } => {
            warn!("graceful shutdown timed out");
        }
    }
}
