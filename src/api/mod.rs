//! HTTP Surface Module
//!
//! The thin adapter between external clients and the storage core: the
//! router under `/api/v0`, the guard middleware (shutdown cutoff + panic
//! recovery), and the error envelope with its stable code enumeration.

pub mod error;
pub mod handlers;


use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Extension, Router};
use futures_util::FutureExt;
use tracing::error;

use crate::cluster::service::Cluster;
use crate::config::Config;
use crate::shutdown::Shutdown;
use crate::storage::memory::Storage;
use self::error::ApiError;

/// Assembles the public router. All routes sit under `/api/v0` behind the
/// guard middleware; shared state is injected as extensions.
pub fn router(
    storage: Arc<Storage>,
    cluster: Arc<Cluster>,
    cfg: Arc<Config>,
    shutdown: Shutdown,
) -> Router {
    let max_body_bytes = std::env::var("MAX_BODY_BYTES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(20 * 1024 * 1024);

    let api = Router::new()
        .route("/ping", any(handlers::handle_ping))
        .route("/nodesize", any(handlers::handle_nodesize))
        .route(
            "/upload",
            post(handlers::handle_upload).put(handlers::handle_upload),
        )
        .route("/download", any(handlers::handle_download))
        .route("/fileinfo", any(handlers::handle_fileinfo))
        .route("/remove", any(handlers::handle_remove))
        .route("/clear", any(handlers::handle_clear))
        .route("/addnode", any(handlers::handle_addnode))
        .layer(middleware::from_fn_with_state(shutdown, guard));

    Router::new()
        .nest("/api/v0", api)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(Extension(storage))
        .layer(Extension(cluster))
        .layer(Extension(cfg))
}

/// Base middleware of all API calls: refuses requests once shutdown has
/// begun, and converts a handler panic into an error reply with the stack
/// so the process survives.
async fn guard(State(shutdown): State<Shutdown>, req: Request, next: Next) -> Response {
    if shutdown.is_triggered() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(panic) => {
            let what = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "panic was thrown at handler".to_string()
            };
            let stack = Backtrace::force_capture().to_string();
            error!("handler panic: {}", what);
            ApiError::panic(what, stack).into_response()
        }
    }
}
