#[cfg(test)]
mod tests {
    use crate::node::client::NodeClient;
    use crate::node::handlers::router;
    use crate::node::memory::{NodeError, NodeStore};
    use crate::node::protocol::{encode_frame, Chunk, FrameDecoder, Range, Summary};
    use std::sync::Arc;
    use std::time::Duration;

    fn chunk(file_id: u64, node_id: u32, from: i64, value: &[u8]) -> Chunk {
        Chunk {
            range: Range {
                node_id,
                file_id,
                from,
                to: from + value.len() as i64,
            },
            value: value.to_vec(),
        }
    }

    /// Serves a fresh node on an ephemeral loopback port.
    async fn spawn_node() -> (NodeClient, Arc<NodeStore>) {
        let store = Arc::new(NodeStore::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(store.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = NodeClient::new(&format!("127.0.0.1:{}", addr.port())).unwrap();
        (client, store)
    }

    // ============================================================
    // FRAME CODEC
    // ============================================================

    #[test]
    fn frame_roundtrip() {
        let sent = chunk(7, 0, 0, b"hello world");
        let frame = encode_frame(&sent).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame);
        let got = decoder.next_frame().unwrap().unwrap();
        assert_eq!(got, sent);
        assert_eq!(decoder.residue(), 0);
    }

    #[test]
    fn frame_decodes_across_split_feeds() {
        let first = chunk(1, 0, 0, b"abcd");
        let second = chunk(1, 0, 4, b"efgh");
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_frame(&first).unwrap());
        wire.extend_from_slice(&encode_frame(&second).unwrap());

        // one byte at a time, the worst case a socket can deliver
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in wire {
            decoder.feed(&[byte]);
            while let Some(chunk) = decoder.next_frame().unwrap() {
                decoded.push(chunk);
            }
        }
        assert_eq!(decoded, vec![first, second]);
        assert_eq!(decoder.residue(), 0);
    }

    #[test]
    fn frame_residue_reports_truncation() {
        let frame = encode_frame(&chunk(1, 0, 0, b"abcdef")).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame[..frame.len() - 2]);
        assert!(decoder.next_frame().unwrap().is_none());
        assert!(decoder.residue() > 0);
    }

    #[test]
    fn frame_rejects_corrupt_length() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&u32::MAX.to_le_bytes());
        assert!(decoder.next_frame().is_err());
    }

    // ============================================================
    // NODE STORE
    // ============================================================

    #[test]
    fn store_initialises_and_extends() {
        let store = NodeStore::new();
        store.apply(chunk(3, 1, 100, b"aaaa"));
        store.apply(chunk(3, 1, 104, b"bb"));

        let got = store
            .read(Range {
                node_id: 1,
                file_id: 3,
                from: 100,
                to: 106,
            })
            .unwrap();
        assert_eq!(got.value, b"aaaabb");
        assert_eq!(store.file_count(), 1);
        assert_eq!(store.sum_size(), 6);
    }

    #[test]
    fn store_read_subrange() {
        let store = NodeStore::new();
        store.apply(chunk(9, 0, 10, b"0123456789"));

        let got = store
            .read(Range {
                node_id: 0,
                file_id: 9,
                from: 13,
                to: 17,
            })
            .unwrap();
        assert_eq!(got.value, b"3456");
    }

    #[test]
    fn store_read_out_of_range() {
        let store = NodeStore::new();
        store.apply(chunk(9, 0, 10, b"0123456789"));

        let err = store
            .read(Range {
                node_id: 0,
                file_id: 9,
                from: 5,
                to: 15,
            })
            .unwrap_err();
        assert_eq!(err, NodeError::OutOfRange);
    }

    #[test]
    fn store_read_absent_is_empty() {
        let store = NodeStore::new();
        let got = store
            .read(Range {
                node_id: 0,
                file_id: 404,
                from: 0,
                to: 10,
            })
            .unwrap();
        assert!(got.value.is_empty());
        assert_eq!(got.range, Range::default());
    }

    #[test]
    fn store_remove_and_purge() {
        let store = NodeStore::new();
        store.apply(chunk(1, 0, 0, b"xy"));
        store.apply(chunk(2, 0, 0, b"z"));

        let removed = store.remove(1);
        assert_eq!((removed.from, removed.to), (0, 2));
        // second remove finds nothing
        assert_eq!(store.remove(1), Range::default());

        store.purge();
        assert_eq!(store.file_count(), 0);
        assert_eq!(store.sum_size(), 0);
    }

    // ============================================================
    // OVER THE WIRE
    // ============================================================

    #[tokio::test]
    async fn write_stream_roundtrip() {
        let (client, store) = spawn_node().await;

        let parts: Vec<&[u8]> = vec![b"the quick ", b"brown fox ", b"jumps"];
        let mut from = 0i64;
        let mut frames = Vec::new();
        for part in &parts {
            frames.push(encode_frame(&chunk(42, 0, from, part)).unwrap());
            from += part.len() as i64;
        }

        let resp = client.write(frames.into_iter().map(Ok)).await.unwrap();
        let summary: Summary = resp.json().await.unwrap();
        assert_eq!(summary.chunk_count, 3);
        assert!(summary.elapsed_time >= 0);

        let got = client
            .read(Range {
                node_id: 0,
                file_id: 42,
                from: 0,
                to: 25,
            })
            .await
            .unwrap();
        assert_eq!(&got[..], b"the quick brown fox jumps");
        assert_eq!(store.sum_size(), 25);

        let status = client.status(Duration::from_secs(1)).await.unwrap();
        assert_eq!(status.files, 1);
        assert_eq!(status.sum_size, 25);
    }

    #[tokio::test]
    async fn read_out_of_range_over_wire() {
        let (client, store) = spawn_node().await;
        store.apply(chunk(5, 0, 0, b"abc"));

        let err = client
            .read(Range {
                node_id: 0,
                file_id: 5,
                from: 0,
                to: 100,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("416"), "got: {}", err);
    }

    #[tokio::test]
    async fn absent_file_reads_empty_over_wire() {
        let (client, _store) = spawn_node().await;
        let got = client
            .read(Range {
                node_id: 0,
                file_id: 123,
                from: 0,
                to: 8,
            })
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn remove_and_purge_over_wire() {
        let (client, store) = spawn_node().await;
        store.apply(chunk(8, 2, 64, b"payload!"));

        let removed = client.remove(8, Duration::from_secs(1)).await.unwrap();
        assert_eq!((removed.from, removed.to), (64, 72));
        assert_eq!(store.file_count(), 0);

        // removing again yields the zero range, not an error
        let removed = client.remove(8, Duration::from_secs(1)).await.unwrap();
        assert!(removed.is_empty());

        store.apply(chunk(9, 2, 0, b"a"));
        client.purge(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.file_count(), 0);
    }
}
