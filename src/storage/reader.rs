//! Random-access reader over a scattered file.
//!
//! A [`FileReader`] reassembles the bytes of one committed record by
//! dispatching range reads to the nodes owning the intersecting chunks and
//! stitching the payloads back in order. Chunks abut exactly, so the copied
//! regions tile the destination buffer without gaps.

use std::io::SeekFrom;
use std::sync::Arc;

use thiserror::Error;

use super::memory::Storage;
use super::types::FileRecord;
use crate::node::protocol::Range;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("seek to a negative position")]
    NegativePosition,
    #[error("read at a negative offset")]
    NegativeOffset,
    #[error(transparent)]
    Node(#[from] anyhow::Error),
}

/// Cursor-based reader over one file record.
pub struct FileReader {
    storage: Arc<Storage>,
    record: Arc<FileRecord>,
    pos: i64,
}

impl FileReader {
    pub fn new(storage: Arc<Storage>, record: Arc<FileRecord>) -> Self {
        Self {
            storage,
            record,
            pos: 0,
        }
    }

    /// Original length of the file; never changes.
    pub fn size(&self) -> i64 {
        self.record.size
    }

    pub fn position(&self) -> i64 {
        self.pos
    }

    /// Moves the cursor. Any non-negative position is accepted, including
    /// past the end; the following read then reports end of stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<i64, ReadError> {
        let abs = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => self.pos + delta,
            SeekFrom::End(delta) => self.record.size + delta,
        };
        if abs < 0 {
            return Err(ReadError::NegativePosition);
        }
        self.pos = abs;
        Ok(abs)
    }

    /// Reads into `buf` at the cursor and advances it. Returns the number
    /// of bytes read; 0 means end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.pos >= self.record.size || buf.is_empty() {
            return Ok(0);
        }
        let off = self.pos;
        let end = (off + buf.len() as i64).min(self.record.size);
        let n = self.read_range(off, end, buf).await?;
        self.pos = end;
        Ok(n)
    }

    /// Positioned read; the cursor does not move. A read that starts at or
    /// past the end returns 0 bytes.
    pub async fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize, ReadError> {
        if offset < 0 {
            return Err(ReadError::NegativeOffset);
        }
        if offset >= self.record.size || buf.is_empty() {
            return Ok(0);
        }
        let end = (offset + buf.len() as i64).min(self.record.size);
        self.read_range(offset, end, buf).await
    }

    /// Fans out over the chunks intersecting `[off, end)`, sequentially,
    /// copying each payload to its place in `buf`.
    async fn read_range(&self, off: i64, end: i64, buf: &mut [u8]) -> Result<usize, ReadError> {
        let mut n = 0usize;
        for rng in &self.record.chunks {
            if !rng.overlaps(off, end) {
                continue;
            }
            let from = rng.from.max(off);
            let to = rng.to.min(end);

            let client = self
                .storage
                .client(rng.node_id)
                .await
                .ok_or_else(|| anyhow::anyhow!("node {} has no live connection", rng.node_id))?;
            let payload = client
                .read(Range {
                    node_id: rng.node_id,
                    file_id: rng.file_id,
                    from,
                    to,
                })
                .await?;

            let at = (from - off) as usize;
            let len = payload.len().min(buf.len() - at);
            buf[at..at + len].copy_from_slice(&payload[..len]);
            n += len;
        }
        Ok(n)
    }
}
