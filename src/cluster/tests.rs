#[cfg(test)]
mod tests {
    use crate::cluster::service::Cluster;
    use crate::node::handlers::router;
    use crate::node::memory::NodeStore;
    use crate::shutdown::Shutdown;
    use crate::storage::memory::Storage;
    use std::sync::Arc;
    use std::time::Duration;

    async fn spawn_node() -> String {
        let store = Arc::new(NodeStore::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(store);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    #[tokio::test]
    async fn connect_all_publishes_clients() {
        let addrs = vec![spawn_node().await, spawn_node().await];
        let storage = Arc::new(Storage::with_nodes(&addrs));
        let shutdown = Shutdown::new();
        let cluster = Cluster::new(storage.clone(), shutdown.clone());

        cluster.connect_all().await;
        assert!(!shutdown.is_triggered());

        let nodes = storage.nodes.read().await;
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.client.is_some()));
    }

    #[tokio::test]
    async fn connect_blocks_until_shutdown() {
        // nothing listens on this address, so the dial keeps retrying
        let addrs = vec!["127.0.0.1:1".to_string()];
        let storage = Arc::new(Storage::with_nodes(&addrs));
        let shutdown = Shutdown::new();
        let cluster = Cluster::new(storage.clone(), shutdown.clone());

        let waited = tokio::time::timeout(Duration::from_millis(300), cluster.connect_all()).await;
        assert!(waited.is_err(), "barrier released without a connection");

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), cluster.connect_all())
            .await
            .expect("barrier must release after shutdown");
        assert!(storage.nodes.read().await[0].client.is_none());
        cluster.drain().await;
    }

    #[tokio::test]
    async fn invalid_address_is_fatal() {
        let addrs = vec!["not a valid address".to_string()];
        let storage = Arc::new(Storage::with_nodes(&addrs));
        let shutdown = Shutdown::new();
        let cluster = Cluster::new(storage.clone(), shutdown.clone());

        cluster.connect_all().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn add_node_appends_and_dials() {
        let first = spawn_node().await;
        let storage = Arc::new(Storage::with_nodes(&[first.clone()]));
        let shutdown = Shutdown::new();
        let cluster = Cluster::new(storage.clone(), shutdown.clone());
        cluster.connect_all().await;

        let second = spawn_node().await;
        let id = cluster.add_node(&second).await.expect("fresh address");
        assert_eq!(id, 1);

        let nodes = storage.nodes.read().await;
        assert_eq!(nodes.len(), 2);
        assert!(nodes[1].client.is_some());
        assert_eq!(nodes[1].sum_size, 0);
    }

    #[tokio::test]
    async fn add_node_rejects_duplicate_address() {
        let addr = spawn_node().await;
        let storage = Arc::new(Storage::with_nodes(&[addr.clone()]));
        let shutdown = Shutdown::new();
        let cluster = Cluster::new(storage.clone(), shutdown.clone());
        cluster.connect_all().await;

        assert!(cluster.add_node(&addr).await.is_none());
        assert_eq!(storage.node_count().await, 1);
    }
}
