//! Coordinator-side record types.

use serde::{Deserialize, Serialize};

use crate::node::protocol::Range;

/// MIME value recorded when the upload does not carry one.
pub const MIME_UNKNOWN: &str = "N/A";

/// File information about chunks placed at nodes.
///
/// Committed records are immutable: chunks are sorted by `from`, start at
/// offset 0, abut exactly, and end at `size`. Every chunk's `node_id` was a
/// valid node-table index at commit time; nodes are append-only, so it
/// stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: u64,
    pub name: String,
    pub size: i64,
    pub mime: String,
    pub chunks: Vec<Range>,
}
