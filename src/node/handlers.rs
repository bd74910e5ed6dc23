//! Node API Handlers
//!
//! HTTP endpoints a storage node exposes to the front coordinator. These
//! translate requests into [`NodeStore`] calls; the write endpoint consumes
//! the framed body incrementally so memory stays bounded by the frame size.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::Extension;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;

use super::memory::{NodeError, NodeStore};
use super::protocol::{
    Empty, FileId, FrameDecoder, NodeStatus, Range, Summary, ENDPOINT_PURGE, ENDPOINT_READ,
    ENDPOINT_REMOVE, ENDPOINT_STATUS, ENDPOINT_WRITE,
};

/// Builds the node router. Used by the node binary and by tests.
pub fn router(store: Arc<NodeStore>) -> Router {
    Router::new()
        .route(ENDPOINT_WRITE, post(handle_write))
        .route(ENDPOINT_READ, post(handle_read))
        .route(ENDPOINT_REMOVE, post(handle_remove))
        .route(ENDPOINT_PURGE, post(handle_purge))
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(store))
}

/// Consumes a stream of chunk frames and applies each to the store.
/// Replies with the receipt once the body is fully drained.
pub async fn handle_write(Extension(store): Extension<Arc<NodeStore>>, body: Body) -> Response {
    let started = Instant::now();
    let mut decoder = FrameDecoder::new();
    let mut count: i32 = 0;

    let mut stream = body.into_data_stream();
    while let Some(piece) = stream.next().await {
        let piece = match piece {
            Ok(data) => data,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("body error: {}", e)).into_response();
            }
        };
        decoder.feed(&piece);
        loop {
            match decoder.next_frame() {
                Ok(Some(chunk)) => {
                    store.apply(chunk);
                    count += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    return (StatusCode::BAD_REQUEST, format!("bad frame: {}", e)).into_response();
                }
            }
        }
    }
    if decoder.residue() > 0 {
        return (StatusCode::BAD_REQUEST, "truncated frame".to_string()).into_response();
    }

    tracing::info!("fetched {} items", count);
    Json(Summary {
        chunk_count: count,
        elapsed_time: started.elapsed().as_nanos() as i64,
    })
    .into_response()
}

/// Returns the raw bytes of the requested interval. An unknown file replies
/// with an empty body; an interval outside the stored record is refused.
pub async fn handle_read(
    Extension(store): Extension<Arc<NodeStore>>,
    Json(range): Json<Range>,
) -> Response {
    match store.read(range) {
        Ok(chunk) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            chunk.value,
        )
            .into_response(),
        Err(e @ NodeError::OutOfRange) => {
            (StatusCode::RANGE_NOT_SATISFIABLE, e.to_string()).into_response()
        }
    }
}

pub async fn handle_remove(
    Extension(store): Extension<Arc<NodeStore>>,
    Json(arg): Json<FileId>,
) -> Json<Range> {
    Json(store.remove(arg.id))
}

pub async fn handle_purge(Extension(store): Extension<Arc<NodeStore>>) -> Json<Empty> {
    store.purge();
    Json(Empty {})
}

pub async fn handle_status(Extension(store): Extension<Arc<NodeStore>>) -> Json<NodeStatus> {
    Json(NodeStatus {
        files: store.file_count(),
        sum_size: store.sum_size(),
    })
}
