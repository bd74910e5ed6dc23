//! Partition Planner
//!
//! Maps an incoming file onto the node fleet: a pure function from the file
//! size, the chunking limits, and a snapshot of per-node fill to an ordered
//! list of ranges covering `[0, size)` with no gaps or overlaps.
//!
//! ## Policies
//! - **Small files** (at most one minimum-size chunk per node): one chunk of
//!   `min_chunk` bytes per node starting at node 0, the last one truncated.
//! - **Fluid fill**: partition lengths weighted by how empty each node is,
//!   so sparsely used nodes receive more of the new file.
//! - **Uniform**: equal split with the remainder on the last node.

use tracing::debug;

use crate::node::protocol::Range;

/// Computes the partition plan for a file of `size` bytes.
///
/// `node_sizes` is a snapshot of `sum_size` per node taken under the table
/// read lock; its length is the node count. A `min_chunk` of zero marks the
/// file as indivisible, which routes every non-trivial size to the fill
/// policies below.
pub fn plan(file_id: u64, size: i64, min_chunk: i64, fluid: bool, node_sizes: &[i64]) -> Vec<Range> {
    let nn = node_sizes.len() as i64;

    // chunk count and remainder under the minimum chunk size
    let (cn, cr) = if min_chunk == 0 {
        (i64::MAX, 0)
    } else {
        let mut cn = size / min_chunk;
        let cr = size % min_chunk;
        if cr > 0 {
            cn += 1;
        }
        (cn, cr)
    };

    if cn <= nn {
        // one minimum-size chunk per node, first nodes first
        let mut chunks = Vec::with_capacity(cn as usize);
        for i in 0..cn {
            chunks.push(Range {
                node_id: i as u32,
                file_id,
                from: min_chunk * i,
                to: min_chunk * (i + 1),
            });
        }
        // last chunk keeps the remainder
        if cr > 0 {
            if let Some(last) = chunks.last_mut() {
                last.to = last.from + cr;
            }
        }
        chunks
    } else if fluid && nn > 1 {
        let volume: i64 = node_sizes.iter().sum();

        // weight each node by its free share of the total volume
        let mut lens = vec![0i64; node_sizes.len()];
        let mut fsum = 0i64;
        for (i, &used) in node_sizes.iter().enumerate() {
            let percent = if volume > 0 {
                used as f64 / volume as f64
            } else {
                1.0 / nn as f64
            };
            let portion = (1.0 - percent) / (nn - 1) as f64;
            lens[i] = (size as f64 * portion) as i64;
            fsum += lens[i];
            debug!("node#{}, portion={}, size={}", i, portion, lens[i]);
        }
        // flooring leaves a shortfall; the first node absorbs it
        if fsum < size {
            lens[0] += size - fsum;
        } else if fsum > size {
            panic!("negative remainder received for file {}", file_id);
        }

        let mut pos = 0i64;
        let mut chunks = Vec::with_capacity(node_sizes.len());
        for (i, &len) in lens.iter().enumerate() {
            chunks.push(Range {
                node_id: i as u32,
                file_id,
                from: pos,
                to: pos + len,
            });
            pos += len;
        }
        chunks
    } else {
        let cs = size / nn;
        let mut chunks = Vec::with_capacity(node_sizes.len());
        for i in 0..nn {
            chunks.push(Range {
                node_id: i as u32,
                file_id,
                from: cs * i,
                to: cs * (i + 1),
            });
        }
        // last chunk keeps the remainder
        if let Some(last) = chunks.last_mut() {
            last.to += size % nn;
        }
        chunks
    }
}
