//! Node-connection lifecycle.
//!
//! Every node gets one background task that dials with blocking semantics:
//! it probes the node's status endpoint until the node answers or shutdown
//! begins, publishes the client handle into the node table, and then holds
//! until shutdown. Readiness is reported through a oneshot used as the
//! startup barrier, so HTTP listeners open only after the whole fleet is
//! reachable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::node::client::NodeClient;
use crate::shutdown::Shutdown;
use crate::storage::memory::Storage;

/// Per-probe deadline of the dial handshake.
const DIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the lifecycle tasks of the node fleet.
pub struct Cluster {
    storage: Arc<Storage>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Cluster {
    pub fn new(storage: Arc<Storage>, shutdown: Shutdown) -> Arc<Self> {
        Arc::new(Self {
            storage,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Dials every configured node and waits until each one is connected or
    /// shutdown has begun. The caller checks the shutdown state afterwards
    /// to decide whether startup may proceed.
    pub async fn connect_all(&self) {
        let entries: Vec<(u32, String)> = self
            .storage
            .nodes
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32, n.addr.clone()))
            .collect();

        let mut barrier = Vec::with_capacity(entries.len());
        for (node_id, addr) in entries {
            barrier.push(self.spawn_connect(node_id, addr).await);
        }
        for ready in barrier {
            // an error here means the task quit on shutdown before publishing
            let _ = ready.await;
        }
    }

    /// Launches the lifecycle task of one node. The receiver resolves once
    /// the client handle is published into the table.
    pub async fn spawn_connect(&self, node_id: u32, addr: String) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let storage = self.storage.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            connect_task(storage, shutdown, node_id, addr, tx).await;
        });
        self.tasks.lock().await.push(handle);
        rx
    }

    /// Appends a node at runtime, dials it, and waits on its single-node
    /// barrier. Returns the id of the new slot, or `None` for a duplicate
    /// address. Existing records and statistics are untouched.
    pub async fn add_node(&self, addr: &str) -> Option<u32> {
        let node_id = self.storage.append_node(addr).await?;
        let ready = self.spawn_connect(node_id, addr.to_string()).await;
        let _ = ready.await;
        Some(node_id)
    }

    /// Waits for every lifecycle task to finish; called after shutdown so
    /// the process exits with the fleet fully released.
    pub async fn drain(&self) {
        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Blocking-dial semantics: probe until the node answers or shutdown fires.
/// An address that cannot even form a client is a configuration error and
/// fatal; any failure after the signal is silent.
async fn connect_task(
    storage: Arc<Storage>,
    shutdown: Shutdown,
    node_id: u32,
    addr: String,
    ready: oneshot::Sender<()>,
) {
    let client = match NodeClient::new(&addr) {
        Ok(client) => client,
        Err(e) => {
            if !shutdown.is_triggered() {
                error!("fail to dial on {}: {}", addr, e);
                shutdown.trigger();
            }
            return;
        }
    };

    info!("connection wait on {}", addr);
    let mut delay_ms = 150u64;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("connection canceled on {}", addr);
                return;
            }
            probe = client.status(DIAL_PROBE_TIMEOUT) => match probe {
                Ok(_) => break,
                Err(_) => {
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }
    }

    {
        let mut nodes = storage.nodes.write().await;
        if let Some(entry) = nodes.get_mut(node_id as usize) {
            entry.client = Some(client);
        }
    }
    info!("connection established on {}", addr);
    let _ = ready.send(());

    // hold the slot until the service goes down
    shutdown.cancelled().await;
    info!("disconnected on {}", addr);
}
