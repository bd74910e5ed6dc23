//! Node Wire Contract
//!
//! Defines the API endpoints and Data Transfer Objects used between the
//! front coordinator and a storage node, plus the binary frame codec of the
//! write stream.
//!
//! Control messages travel as JSON; the write stream is a plain
//! `application/octet-stream` body carrying a sequence of length-prefixed
//! bincode frames, one [`Chunk`] per frame.

use anyhow::{bail, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Client-streamed chunk upload; replies with a [`Summary`].
pub const ENDPOINT_WRITE: &str = "/write";
/// Byte-range read; replies with the raw payload.
pub const ENDPOINT_READ: &str = "/read";
/// Record removal; replies with the stored [`Range`] (zero range if absent).
pub const ENDPOINT_REMOVE: &str = "/remove";
/// Atomic discard of all records.
pub const ENDPOINT_PURGE: &str = "/purge";
/// Health and fill snapshot; also used as the dial handshake.
pub const ENDPOINT_STATUS: &str = "/status";

// --- Data Transfer Objects ---

/// Half-open byte interval `[from, to)` of one file assigned to one node.
///
/// `from` and `to` are absolute offsets inside the file, not offsets inside
/// the node's local record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub node_id: u32,
    pub file_id: u64,
    pub from: i64,
    pub to: i64,
}

impl Range {
    pub fn len(&self) -> i64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    /// True when the interval `[from, to)` intersects this range.
    pub fn overlaps(&self, from: i64, to: i64) -> bool {
        self.from < to && self.to > from
    }
}

/// A [`Range`] carrying its payload; `value.len()` equals `range.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub range: Range,
    pub value: Vec<u8>,
}

/// File identifier argument of the remove call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileId {
    pub id: u64,
}

/// Write stream receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Summary {
    /// Number of chunk frames consumed.
    pub chunk_count: i32,
    /// Wall time spent receiving the stream, in nanoseconds.
    pub elapsed_time: i64,
}

/// Empty message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Reply of the status endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Number of file records held.
    pub files: usize,
    /// Total payload bytes held.
    pub sum_size: i64,
}

// --- Write stream frame codec ---

/// Upper bound on a single encoded frame; a stream chunk is normally a few
/// KiB, so anything near this limit is a corrupt length prefix.
pub const MAX_FRAME_LEN: usize = 64 << 20;

/// Encodes one chunk as a length-prefixed bincode frame.
pub fn encode_frame(chunk: &Chunk) -> Result<Bytes> {
    let body = bincode::serialize(chunk)?;
    if body.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds the limit", body.len());
    }
    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32_le(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Incremental decoder for a stream of frames.
///
/// Body data arrives in arbitrary pieces; the decoder buffers until a whole
/// frame is available and yields chunks in stream order.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete chunk, or `None` if more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<Chunk>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame length {} exceeds the limit", len);
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        self.buf.advance(4);
        let body = self.buf.split_to(len);
        let chunk = bincode::deserialize(&body)?;
        Ok(Some(chunk))
    }

    /// Bytes left in the buffer; non-zero after the body ends means the
    /// stream was truncated mid-frame.
    pub fn residue(&self) -> usize {
        self.buf.len()
    }
}
