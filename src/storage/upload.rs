//! Streaming upload pipeline.
//!
//! Takes a fully received upload body, plans its partitions, streams each
//! partition to the owning node as a sequence of fixed-size chunk frames,
//! and commits the record on success. Any failure rolls back every
//! partition of the plan before surfacing the error: a write stream may
//! have created an empty record on a node before the first payload byte,
//! so the sweep covers nodes that never received data too.
//!
//! Streaming is sequential per partition and across partitions; chunk order
//! within a partition is required by the node write contract.

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::memory::Storage;
use super::planner;
use super::types::FileRecord;
use crate::config::StorageConfig;
use crate::node::protocol::{encode_frame, Chunk, Range, Summary};

/// Upload failure tagged with the pipeline stage that broke.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("node {node_id} has no live connection")]
    NotConnected { node_id: u32 },
    #[error("write stream to node {node_id} failed: {source}")]
    Stream {
        node_id: u32,
        source: anyhow::Error,
    },
    #[error("write receipt from node {node_id} failed: {source}")]
    Receipt {
        node_id: u32,
        source: anyhow::Error,
    },
}

/// Runs the whole pipeline for one upload. On success the returned record
/// is committed and fully readable; on error nothing is observable and the
/// per-node statistics are unchanged.
pub async fn store_file(
    storage: &Storage,
    cfg: &StorageConfig,
    name: String,
    mime: String,
    body: Bytes,
) -> Result<std::sync::Arc<FileRecord>, UploadError> {
    let size = body.len() as i64;
    let file_id = storage.next_file_id();
    info!("upload file: {}, size: {}, mime: {}", name, size, mime);

    let sizes = storage.snapshot_sizes().await;
    let chunks = planner::plan(
        file_id,
        size,
        cfg.min_node_chunk_size,
        cfg.node_fluid_fill,
        &sizes,
    );

    for (i, rng) in chunks.iter().enumerate() {
        if let Err(e) = stream_partition(storage, cfg, &body, *rng, i).await {
            warn!("upload of file {} failed: {}", file_id, e);
            rollback(storage, &chunks, cfg.api_timeout).await;
            return Err(e);
        }
    }

    // commit point: the file becomes visible only after this insert
    let record = storage
        .insert(FileRecord {
            file_id,
            name,
            size,
            mime,
            chunks,
        })
        .await;
    Ok(record)
}

/// Streams one partition to its node and checks the receipt.
async fn stream_partition(
    storage: &Storage,
    cfg: &StorageConfig,
    body: &Bytes,
    rng: Range,
    index: usize,
) -> Result<(), UploadError> {
    let client = storage
        .client(rng.node_id)
        .await
        .ok_or(UploadError::NotConnected {
            node_id: rng.node_id,
        })?;

    let frames = partition_frames(body.clone(), rng, cfg.stream_chunk_size);
    let resp = client
        .write(frames)
        .await
        .map_err(|source| UploadError::Stream {
            node_id: rng.node_id,
            source,
        })?;
    let summary: Summary = resp.json().await.map_err(|e| UploadError::Receipt {
        node_id: rng.node_id,
        source: e.into(),
    })?;

    info!(
        "chunk {}, size {}, time {:?}",
        index,
        rng.len(),
        Duration::from_nanos(summary.elapsed_time.max(0) as u64)
    );
    Ok(())
}

/// Lazy frame iterator over one partition: full slices of the stream chunk
/// size followed by the tail remainder. Slicing shares the body buffer, so
/// memory per in-flight frame is one encoded chunk.
fn partition_frames(
    body: Bytes,
    rng: Range,
    stream_chunk: i64,
) -> impl Iterator<Item = Result<Bytes>> + Send + Sync + 'static {
    let total = rng.len();
    let full = total / stream_chunk;
    let tail = total % stream_chunk;
    let count = full + if tail > 0 { 1 } else { 0 };

    (0..count).map(move |j| {
        let from = rng.from + j * stream_chunk;
        let to = if j == full {
            from + tail
        } else {
            from + stream_chunk
        };
        let chunk = Chunk {
            range: Range {
                node_id: rng.node_id,
                file_id: rng.file_id,
                from,
                to,
            },
            value: body.slice(from as usize..to as usize).to_vec(),
        };
        encode_frame(&chunk)
    })
}

/// Best-effort removal of every partition of a failed upload. Errors are
/// logged and otherwise ignored; the upload is already in a failed state.
async fn rollback(storage: &Storage, chunks: &[Range], timeout: Duration) {
    for rng in chunks {
        let Some(client) = storage.client(rng.node_id).await else {
            continue;
        };
        if let Err(e) = client.remove(rng.file_id, timeout).await {
            debug!("rollback remove on node {} failed: {}", rng.node_id, e);
        }
    }
}
