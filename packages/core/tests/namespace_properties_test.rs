//! Namespace Engine Properties
//!
//! The same scenarios run against both graph backends:
//! - `MemoryGraph` (in process)
//! - `SurrealGraph` on an embedded RocksDB file
//!
//! ## Test Coverage
//! - End-to-end insert of `t1/docs/report.pdf` and its subtree query
//! - Re-insert no-op and restore conflict
//! - Non-directory ancestor conflict leaves the graph unchanged
//! - Soft-delete and move round trips
//! - Two concurrent inserts of the same blob: one wins, the other conflicts

#[cfg(test)]
mod namespace_properties_tests {
    use anyhow::Result;
    use graphdisk_core::db::{GraphStore, MemoryGraph, SurrealGraph};
    use graphdisk_core::operations::build_tree;
    use graphdisk_core::{
        Caller, InsertOutcome, InsertRequest, LeafDescriptor, NamespaceError, NamespaceService,
        NodeAttribute, NodeType, ROOT_MARKER, TRASH_MARKER,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper to create a RocksDB-backed graph
    async fn create_surreal_graph() -> Result<(Arc<dyn GraphStore>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let graph = SurrealGraph::open(temp_dir.path().join("graph")).await?;
        Ok((Arc::new(graph), temp_dir))
    }

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    fn pdf(blob: &str) -> LeafDescriptor {
        LeafDescriptor::file(blob, "application/pdf", 1024, "filehash")
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    async fn end_to_end_insert(graph: Arc<dyn GraphStore>) -> Result<()> {
        let service = NamespaceService::new(graph);
        let t1 = Caller::new("t1");

        let outcome = service
            .insert_path(&t1, InsertRequest::new("t1", "docs/report.pdf", pdf("r.pdf")))
            .await?;
        assert!(matches!(outcome, InsertOutcome::Created { .. }));

        let root = service
            .find_node(NodeAttribute::FileName, ROOT_MARKER)
            .await?
            .expect("root exists");
        assert_eq!(root.node_type, NodeType::Root);

        let tenant = service.resolve_path(&t1, &segs("t1")).await?;
        assert_eq!(tenant.node_type, NodeType::User);
        let docs = service.resolve_path(&t1, &segs("t1/docs")).await?;
        assert!(docs.is_dir);
        let leaf = service.resolve_path(&t1, &segs("t1/docs/report.pdf")).await?;
        assert_eq!(leaf.file_name, "r.pdf");
        assert_eq!(leaf.content_type, "application/pdf");
        assert_eq!(leaf.size, 1024);
        assert_eq!(leaf.file_hash, "filehash");

        let subtree = service.subtree_paths(&tenant.file_name, true).await?;
        assert_eq!(
            subtree.paths,
            vec![vec![
                tenant.file_name.clone(),
                docs.file_name.clone(),
                "r.pdf".to_string()
            ]]
        );
        let tree = build_tree(&subtree).expect("tree");
        assert_eq!(tree.node_count(), 3);
        Ok(())
    }

    async fn reinsert_and_restore(graph: Arc<dyn GraphStore>) -> Result<()> {
        let service = NamespaceService::new(graph);
        let t1 = Caller::new("t1");
        let request = InsertRequest::new("t1", "a/b.pdf", pdf("b.pdf"));

        service.insert_path(&t1, request.clone()).await?;
        let again = service.insert_path(&t1, request.clone()).await?;
        assert!(matches!(again, InsertOutcome::AlreadyExists(_)));

        let restore = service.insert_path(&t1, request.restore()).await;
        assert!(matches!(restore, Err(NamespaceError::Conflict(_))));
        Ok(())
    }

    async fn file_ancestor_conflict(graph: Arc<dyn GraphStore>) -> Result<()> {
        let service = NamespaceService::new(graph);
        let t1 = Caller::new("t1");
        service
            .insert_path(&t1, InsertRequest::new("t1", "x.pdf", pdf("x.pdf")))
            .await?;
        let before = service.subtree_paths(ROOT_MARKER, true).await?;

        let result = service
            .insert_path(&t1, InsertRequest::new("t1", "x.pdf/y.pdf", pdf("y.pdf")))
            .await;
        assert!(matches!(result, Err(NamespaceError::Conflict(_))));

        let after = service.subtree_paths(ROOT_MARKER, true).await?;
        assert_eq!(before.paths, after.paths);
        assert!(service
            .find_node(NodeAttribute::FileName, "y.pdf")
            .await?
            .is_none());
        Ok(())
    }

    async fn soft_delete_and_move(graph: Arc<dyn GraphStore>) -> Result<()> {
        let service = NamespaceService::new(graph);
        let t1 = Caller::new("t1");
        service
            .insert_path(&t1, InsertRequest::new("t1", "docs/old.pdf", pdf("old.pdf")))
            .await?;
        service
            .insert_path(&t1, InsertRequest::new("t1", "archive", LeafDescriptor::directory()))
            .await?;

        // Move round trip
        let docs = service.resolve_path(&t1, &segs("t1/docs")).await?;
        service
            .move_subtree(&t1, &segs("t1/docs/old.pdf"), &segs("t1/archive"))
            .await?;
        assert!(service.resolve_path(&t1, &segs("t1/archive/old.pdf")).await.is_ok());
        service
            .move_subtree(&t1, &segs("t1/archive/old.pdf"), &segs("t1/docs"))
            .await?;
        let parent = service.ancestors("old.pdf").await?;
        assert_eq!(parent[1].file_name, docs.file_name);

        // Soft delete round trip
        service.soft_delete(&t1, "old.pdf").await?;
        assert!(matches!(
            service.resolve_path(&t1, &segs("t1/docs/old.pdf")).await,
            Err(NamespaceError::NotFound(_))
        ));
        let trashed = service
            .resolve_path(&t1, &segs(&format!("{}/t1/old.pdf", TRASH_MARKER)))
            .await?;
        assert_eq!(trashed.file_name, "old.pdf");
        assert!(matches!(
            service.soft_delete(&t1, "old.pdf").await,
            Err(NamespaceError::NotFound(_))
        ));
        Ok(())
    }

    async fn concurrent_same_blob(graph: Arc<dyn GraphStore>) -> Result<()> {
        let service = NamespaceService::new(graph);
        let t1 = Caller::new("t1");
        service
            .insert_path(&t1, InsertRequest::new("t1", "seed.pdf", pdf("seed.pdf")))
            .await?;

        let (left, right) = tokio::join!(
            service.insert_path(&t1, InsertRequest::new("t1", "a/x.pdf", pdf("x.pdf"))),
            service.insert_path(&t1, InsertRequest::new("t1", "b/x.pdf", pdf("x.pdf"))),
        );
        let (winner, loser_dir, loser) = match (left, right) {
            (Ok(won), lost) => (won, "t1/b", lost),
            (lost, Ok(won)) => (won, "t1/a", lost),
            (Err(a), Err(b)) => anyhow::bail!("both inserts failed: {a}; {b}"),
        };
        assert!(matches!(winner, InsertOutcome::Created { .. }));
        assert!(
            matches!(loser, Err(NamespaceError::Conflict(_))),
            "loser returned {:?}",
            loser
        );

        // Nothing of the losing insert is left behind
        assert!(matches!(
            service.resolve_path(&t1, &segs(loser_dir)).await,
            Err(NamespaceError::NotFound(_))
        ));
        let tenant = service.resolve_path(&t1, &segs("t1")).await?;
        let subtree = service.subtree_paths(&tenant.file_name, true).await?;
        assert_eq!(subtree.paths.len(), 2);
        let leaves: Vec<&str> = subtree
            .paths
            .iter()
            .filter_map(|chain| chain.last().map(String::as_str))
            .collect();
        assert!(leaves.contains(&"seed.pdf"));
        assert!(leaves.contains(&"x.pdf"));
        Ok(())
    }

    // ========================================================================
    // MemoryGraph
    // ========================================================================

    #[tokio::test]
    async fn test_memory_end_to_end_insert() -> Result<()> {
        end_to_end_insert(Arc::new(MemoryGraph::new())).await
    }

    #[tokio::test]
    async fn test_memory_reinsert_and_restore() -> Result<()> {
        reinsert_and_restore(Arc::new(MemoryGraph::new())).await
    }

    #[tokio::test]
    async fn test_memory_file_ancestor_conflict() -> Result<()> {
        file_ancestor_conflict(Arc::new(MemoryGraph::new())).await
    }

    #[tokio::test]
    async fn test_memory_soft_delete_and_move() -> Result<()> {
        soft_delete_and_move(Arc::new(MemoryGraph::new())).await
    }

    #[tokio::test]
    async fn test_memory_concurrent_same_blob() -> Result<()> {
        concurrent_same_blob(Arc::new(MemoryGraph::new())).await
    }

    // ========================================================================
    // SurrealGraph
    // ========================================================================

    #[tokio::test]
    async fn test_surreal_end_to_end_insert() -> Result<()> {
        let (graph, _temp_dir) = create_surreal_graph().await?;
        end_to_end_insert(graph).await
    }

    #[tokio::test]
    async fn test_surreal_reinsert_and_restore() -> Result<()> {
        let (graph, _temp_dir) = create_surreal_graph().await?;
        reinsert_and_restore(graph).await
    }

    #[tokio::test]
    async fn test_surreal_file_ancestor_conflict() -> Result<()> {
        let (graph, _temp_dir) = create_surreal_graph().await?;
        file_ancestor_conflict(graph).await
    }

    #[tokio::test]
    async fn test_surreal_soft_delete_and_move() -> Result<()> {
        let (graph, _temp_dir) = create_surreal_graph().await?;
        soft_delete_and_move(graph).await
    }

    #[tokio::test]
    async fn test_surreal_concurrent_same_blob() -> Result<()> {
        let (graph, _temp_dir) = create_surreal_graph().await?;
        concurrent_same_blob(graph).await
    }
}
