//! Upload and Merge Pipeline Tests
//!
//! Drives a full in-memory `GraphDisk`: chunks go through `UploadService`, the
//! merge coordinator publishes once the last chunk lands and the background
//! worker assembles the file and inserts it into the tenant tree.
//!
//! ## Test Coverage
//! - Out-of-order chunked upload merged into one leaf
//! - Whole-file upload and per-tenant dedup
//! - Dead-lettering of a merge whose chunks never arrive

#[cfg(test)]
mod upload_merge_tests {
    use anyhow::Result;
    use graphdisk_core::mq::{headers_with_retries, WorkQueue, RETRIES_HEADER};
    use graphdisk_core::{
        Caller, ChunkInfo, CoreConfig, FileNode, GraphDisk, MergeMessage, NamespaceError,
        UploadOutcome, UploadRequest,
    };
    use std::time::Duration;

    fn test_config() -> CoreConfig {
        CoreConfig {
            retry_backoff_ms: 10,
            max_retries: 2,
            ..CoreConfig::default()
        }
    }

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    /// Poll until the worker has inserted `path`
    async fn wait_for_node(disk: &GraphDisk, caller: &Caller, path: &str) -> Result<FileNode> {
        for _ in 0..200 {
            match disk.namespace.resolve_path(caller, &segs(path)).await {
                Ok(node) => return Ok(node),
                Err(NamespaceError::NotFound(_)) => {
                    tokio::time::sleep(Duration::from_millis(10)).await
                }
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("{} never appeared", path)
    }

    fn chunk(current: u32, total: u32, data: &[u8]) -> UploadRequest {
        UploadRequest::whole("t1", "videos/clip.mp4", "clip.mp4", data.to_vec()).with_chunk(
            ChunkInfo {
                current,
                total,
                file_hash: "clip-hash".to_string(),
                file_size: 6,
            },
        )
    }

    #[tokio::test]
    async fn test_chunked_upload_is_merged() -> Result<()> {
        let disk = GraphDisk::in_memory(test_config()).await?;
        let t1 = Caller::new("t1");

        for (index, data) in [(3, &b"ef"[..]), (1, &b"ab"[..])] {
            let outcome = disk.uploads.upload(&t1, chunk(index, 3, data)).await?;
            assert!(matches!(outcome, UploadOutcome::ChunkAccepted { .. }));
        }
        let last = disk.uploads.upload(&t1, chunk(2, 3, b"cd")).await?;
        let UploadOutcome::MergeDispatched { final_blob_name } = last else {
            panic!("expected dispatch, got {:?}", last);
        };

        let leaf = wait_for_node(&disk, &t1, "t1/videos/clip.mp4").await?;
        assert_eq!(leaf.file_name, final_blob_name);
        assert_eq!(leaf.size, 6);
        assert_eq!(leaf.content_type, "video/mp4");

        let export_dir = tempfile::tempdir()?;
        let exported = disk
            .exports
            .export(&t1, &leaf.file_name, export_dir.path())
            .await?;
        assert_eq!(
            std::fs::read(exported.directory.join("clip.mp4"))?,
            b"abcdef"
        );

        disk.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_whole_file_dedup_per_tenant() -> Result<()> {
        let disk = GraphDisk::in_memory(test_config()).await?;
        let t1 = Caller::new("t1");
        let t2 = Caller::new("t2");
        let body = b"same bytes".to_vec();

        let first = disk
            .uploads
            .upload(&t1, UploadRequest::whole("t1", "a.txt", "a.txt", body.clone()))
            .await?;
        let UploadOutcome::Stored { storage_path, .. } = first else {
            panic!("expected Stored");
        };

        let again = disk
            .uploads
            .upload(&t1, UploadRequest::whole("t1", "b.txt", "b.txt", body.clone()))
            .await?;
        assert_eq!(again, UploadOutcome::Deduplicated { storage_path });
        assert!(disk.namespace.resolve_path(&t1, &segs("t1/b.txt")).await.is_err());

        // Another tenant stores its own copy
        let other = disk
            .uploads
            .upload(&t2, UploadRequest::whole("t2", "a.txt", "a.txt", body))
            .await?;
        assert!(matches!(other, UploadOutcome::Stored { .. }));

        disk.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_with_missing_chunks_is_dead_lettered() -> Result<()> {
        let config = test_config();
        let disk = GraphDisk::in_memory(config.clone()).await?;

        let message = MergeMessage {
            tenant: "t1".to_string(),
            chunks: vec!["ghost.bin_1".to_string(), "ghost.bin_2".to_string()],
            final_blob_name: "ghost.bin".to_string(),
            content_type: String::new(),
            target_path: "t1".to_string(),
            relative_path: "ghost.bin".to_string(),
            display_name: "ghost.bin".to_string(),
            file_hash: "ghost".to_string(),
            declared_size: 0,
        };
        disk.queue()
            .publish(
                &config.merge_queue,
                serde_json::to_vec(&message)?,
                headers_with_retries(0),
            )
            .await?;

        let mut dead = 0;
        for _ in 0..200 {
            dead = disk.queue().depth(&config.dead_letter_queue).await?;
            if dead > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dead, 1);

        let letter = disk.queue().receive(&config.dead_letter_queue).await?;
        assert_eq!(
            letter.headers.get(RETRIES_HEADER).map(String::as_str),
            Some("2")
        );
        assert_eq!(disk.queue().depth(&config.merge_queue).await?, 0);

        disk.shutdown().await;
        Ok(())
    }
}
