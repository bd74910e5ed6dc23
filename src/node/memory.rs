//! In-memory record store of a storage node.
//!
//! One record per `file_id`: the range the node holds plus its payload.
//! Nothing is persisted; a restart loses everything, which the coordinator
//! accepts by contract.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::protocol::{Chunk, Range};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("bounds out of the range")]
    OutOfRange,
}

/// Concurrent map of `file_id` to the stored chunk.
#[derive(Default)]
pub struct NodeStore {
    files: DashMap<u64, Chunk>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one chunk of a write stream. The first chunk of a file
    /// initialises the record; each following chunk appends its payload and
    /// extends the record's end by the payload length. Chunks of one stream
    /// arrive in order, so contiguity holds by construction.
    pub fn apply(&self, chunk: Chunk) {
        match self.files.entry(chunk.range.file_id) {
            Entry::Vacant(slot) => {
                slot.insert(chunk);
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                record.range.to += chunk.value.len() as i64;
                record.value.extend_from_slice(&chunk.value);
            }
        }
    }

    /// Copies out the bytes of `want`. The interval must lie fully inside
    /// the stored record; an unknown file reads as an empty chunk, which is
    /// the "absent" signal rather than an error.
    pub fn read(&self, want: Range) -> Result<Chunk, NodeError> {
        match self.files.get(&want.file_id) {
            Some(record) => {
                if want.from < record.range.from || want.to > record.range.to {
                    return Err(NodeError::OutOfRange);
                }
                let lo = (want.from - record.range.from) as usize;
                let hi = (want.to - record.range.from) as usize;
                Ok(Chunk {
                    range: want,
                    value: record.value[lo..hi].to_vec(),
                })
            }
            None => Ok(Chunk::default()),
        }
    }

    /// Deletes the record and returns its stored range, or the zero range
    /// if the file is unknown.
    pub fn remove(&self, file_id: u64) -> Range {
        match self.files.remove(&file_id) {
            Some((_, chunk)) => chunk.range,
            None => Range::default(),
        }
    }

    /// Discards all records.
    pub fn purge(&self) {
        self.files.clear();
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn sum_size(&self) -> i64 {
        self.files.iter().map(|entry| entry.value.len() as i64).sum()
    }
}
