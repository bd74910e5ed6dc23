//! Coordinator state: the node table, the file index, and the id counter.
//!
//! This is the only mutable shared state of the front. The node table is
//! guarded by a readers/writer lock and holds the per-node aggregates next
//! to the client handles; the file index is a concurrent map with wait-free
//! lookups; file ids come from an atomic counter. Writers hold the table
//! lock for the whole mutation including the aggregate update, so the
//! statistics never drift from the committed records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use super::types::FileRecord;
use crate::node::client::NodeClient;

/// One slot of the node table. `addr` is write-once at construction;
/// `client` is published once by the dial task; the aggregates change only
/// under the table write lock.
#[derive(Debug, Default)]
pub struct NodeEntry {
    pub addr: String,
    pub client: Option<NodeClient>,
    /// Total size of all chunks committed to this node.
    pub sum_size: i64,
    /// Number of chunks committed to this node.
    pub num_chunks: i64,
}

impl NodeEntry {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            ..Default::default()
        }
    }
}

/// Shared coordinator state, created once at startup and threaded through
/// the handlers.
#[derive(Default)]
pub struct Storage {
    /// Files id counter. Each stored file has a unique id; names need not
    /// be unique.
    id_counter: AtomicU64,
    /// Node table; a node's id is its position here, stable because nodes
    /// are only ever appended.
    pub nodes: RwLock<Vec<NodeEntry>>,
    /// Files database keyed by file id.
    files: DashMap<u64, Arc<FileRecord>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table for the configured addresses; clients are published
    /// later by the dial tasks.
    pub fn with_nodes(addrs: &[String]) -> Self {
        Self {
            id_counter: AtomicU64::new(0),
            nodes: RwLock::new(addrs.iter().map(|a| NodeEntry::new(a)).collect()),
            files: DashMap::new(),
        }
    }

    /// Allocates the next file id, starting at 1.
    pub fn next_file_id(&self) -> u64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Consistent snapshot of `sum_size` by node.
    pub async fn snapshot_sizes(&self) -> Vec<i64> {
        self.nodes.read().await.iter().map(|n| n.sum_size).collect()
    }

    /// Client handle of a node, if its dial has completed.
    pub async fn client(&self, node_id: u32) -> Option<NodeClient> {
        self.nodes
            .read()
            .await
            .get(node_id as usize)
            .and_then(|n| n.client.clone())
    }

    /// Commits a record: applies the per-node deltas under the write lock,
    /// then stores the record. The file becomes observable only when this
    /// returns.
    pub async fn insert(&self, record: FileRecord) -> Arc<FileRecord> {
        {
            let mut nodes = self.nodes.write().await;
            for rng in &record.chunks {
                let entry = &mut nodes[rng.node_id as usize];
                entry.num_chunks += 1;
                entry.sum_size += rng.len();
            }
        }
        let record = Arc::new(record);
        self.files.insert(record.file_id, record.clone());
        record
    }

    /// Deletes a record: removes it from the index first so no new reader
    /// can find it, then reverts the aggregates.
    pub async fn delete(&self, record: &FileRecord) {
        self.files.remove(&record.file_id);

        let mut nodes = self.nodes.write().await;
        for rng in &record.chunks {
            let entry = &mut nodes[rng.node_id as usize];
            entry.num_chunks -= 1;
            entry.sum_size -= rng.len();
        }
    }

    pub fn lookup(&self, file_id: u64) -> Option<Arc<FileRecord>> {
        self.files.get(&file_id).map(|e| e.value().clone())
    }

    /// First record with the given name, if any. Best effort: iteration
    /// order under concurrent mutation is unspecified, clients are expected
    /// to prefer the file id.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<FileRecord>> {
        self.files
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| e.value().clone())
    }

    /// Searches by `file_id`, or by `name` when the id is zero.
    pub fn find(&self, file_id: u64, name: &str) -> Option<Arc<FileRecord>> {
        if file_id != 0 {
            self.lookup(file_id)
        } else if !name.is_empty() {
            self.find_by_name(name)
        } else {
            None
        }
    }

    /// Drops the whole index, zeroes every node's aggregates, and resets
    /// the id counter, all under the table write lock.
    pub async fn clear(&self) {
        let mut nodes = self.nodes.write().await;

        self.files.clear();
        for entry in nodes.iter_mut() {
            entry.num_chunks = 0;
            entry.sum_size = 0;
        }
        self.id_counter.store(0, Ordering::SeqCst);
    }

    /// Appends a node slot and returns its id, or `None` when the address
    /// is already present.
    pub async fn append_node(&self, addr: &str) -> Option<u32> {
        let mut nodes = self.nodes.write().await;
        if nodes.iter().any(|n| n.addr == addr) {
            return None;
        }
        let id = nodes.len() as u32;
        nodes.push(NodeEntry::new(addr));
        Some(id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Snapshot of the committed records, safe under concurrent mutation.
    pub fn records(&self) -> Vec<Arc<FileRecord>> {
        self.files.iter().map(|e| e.value().clone()).collect()
    }
}
