//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database, plus one
//! on-disk database for the file-backed constructor.

use chrono::Utc;
use serde_json::json;

use collection_hierarchy::config::DatabaseConfig;
use collection_hierarchy::error::StorageError;
use collection_hierarchy::storage::{Collection, CollectionStore, FacetDescriptor, SqliteStorage};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn assert_invalid_edit(result: Result<(), StorageError>, needle: &str) {
    match result {
        Err(StorageError::InvalidEdit { reason, .. }) => {
            assert!(
                reason.contains(needle),
                "reason {reason:?} should mention {needle:?}"
            );
        }
        other => panic!("expected InvalidEdit, got {other:?}"),
    }
}

#[cfg(test)]
mod crud_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_collection() {
        let storage = create_test_storage().await;

        let collection = Collection::new("articles").with_query("collection:ARTICLE");
        storage.create_collection(&collection).await.unwrap();

        let retrieved = storage.get_collection(&collection.id).await.unwrap();
        assert_eq!(retrieved, Some(collection));
    }

    #[tokio::test]
    async fn test_get_nonexistent_collection() {
        let storage = create_test_storage().await;

        let result = storage.get_collection("nonexistent-id").await.unwrap();
        assert!(result.is_none(), "Should return None for nonexistent collection");
    }

    #[tokio::test]
    async fn test_virtual_flag_and_facets_round_trip() {
        let storage = create_test_storage().await;

        let collection = Collection::new("recent")
            .as_virtual()
            .with_facet(FacetDescriptor::new("authors"))
            .with_facet(FacetDescriptor::new("year").with_settings(json!({"order": "desc"})))
            .with_facet(FacetDescriptor::new("keywords"));
        storage.create_collection(&collection).await.unwrap();

        let retrieved = storage
            .get_collection(&collection.id)
            .await
            .unwrap()
            .unwrap();
        assert!(retrieved.is_virtual);
        let names: Vec<&str> = retrieved.facets.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["authors", "year", "keywords"]);
        assert_eq!(retrieved.facets[1].settings, Some(json!({"order": "desc"})));
    }

    #[tokio::test]
    async fn test_children_in_insertion_order() {
        let storage = create_test_storage().await;

        let root = Collection::new("root");
        storage.create_collection(&root).await.unwrap();

        let mut expected = Vec::new();
        for name in ["zeta", "alpha", "mid"] {
            let child = Collection::new(name).with_parent(&root.id);
            storage.create_collection(&child).await.unwrap();
            expected.push(child.id);
        }

        let children = storage.get_children(&root.id).await.unwrap();
        let ids: Vec<String> = children.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let storage = create_test_storage().await;
        assert_eq!(storage.count_collections().await.unwrap(), 0);

        let a = Collection::new("a");
        let b = Collection::new("b").with_parent(&a.id);
        storage.create_collection(&a).await.unwrap();
        storage.create_collection(&b).await.unwrap();

        assert_eq!(storage.count_collections().await.unwrap(), 2);
        let all = storage.list_collections().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);
    }

    #[tokio::test]
    async fn test_find_by_name_returns_first_match() {
        let storage = create_test_storage().await;

        let first = Collection::new("dup");
        let second = Collection::new("dup");
        storage.create_collection(&first).await.unwrap();
        storage.create_collection(&second).await.unwrap();

        let found = storage.find_by_name("dup").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(storage.find_by_name("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_referrers() {
        let storage = create_test_storage().await;

        let target = Collection::new("target");
        storage.create_collection(&target).await.unwrap();
        let alias = Collection::new("alias").with_reference(&target.id);
        storage.create_collection(&alias).await.unwrap();
        let bystander = Collection::new("bystander");
        storage.create_collection(&bystander).await.unwrap();

        let referrers = storage.get_referrers(&target.id).await.unwrap();
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].id, alias.id);
    }

    #[tokio::test]
    async fn test_update_collection() {
        let storage = create_test_storage().await;

        let a = Collection::new("a");
        let b = Collection::new("b");
        storage.create_collection(&a).await.unwrap();
        storage.create_collection(&b).await.unwrap();

        let mut moved = b.clone();
        moved.name = "b-renamed".to_string();
        moved.parent_id = Some(a.id.clone());
        moved.facets = vec![FacetDescriptor::new("type")];
        moved.updated_at = Utc::now();
        storage.update_collection(&moved).await.unwrap();

        let retrieved = storage.get_collection(&b.id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "b-renamed");
        assert_eq!(retrieved.parent_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(retrieved.facets, vec![FacetDescriptor::new("type")]);
        assert_eq!(retrieved.created_at, b.created_at);
    }

    #[tokio::test]
    async fn test_update_nonexistent_collection() {
        let storage = create_test_storage().await;

        let ghost = Collection::new("ghost");
        let result = storage.update_collection(&ghost).await;
        assert!(matches!(
            result,
            Err(StorageError::CollectionNotFound { ref collection_id }) if collection_id == &ghost.id
        ));
    }

    #[tokio::test]
    async fn test_malformed_facets_column_is_an_error() {
        let storage = create_test_storage().await;

        let collection = Collection::new("broken").with_facet(FacetDescriptor::new("year"));
        storage.create_collection(&collection).await.unwrap();
        sqlx::query("UPDATE collections SET facets = 'not json' WHERE id = ?")
            .bind(&collection.id)
            .execute(storage.pool())
            .await
            .unwrap();

        let result = storage.get_collection(&collection.id).await;
        match result {
            Err(StorageError::Query { message }) => {
                assert!(message.contains("facets"), "unexpected message: {message}");
                assert!(message.contains(&collection.id));
            }
            other => panic!("expected Query error, got {other:?}"),
        }
        assert!(storage.list_collections().await.is_err());
    }

    #[tokio::test]
    async fn test_file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("collections.db"),
            max_connections: 2,
        };

        let collection = Collection::new("persisted");
        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage.create_collection(&collection).await.unwrap();
            storage.pool().close().await;
        }

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let retrieved = reopened.get_collection(&collection.id).await.unwrap();
        assert_eq!(retrieved.map(|c| c.name), Some("persisted".to_string()));
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_reject_missing_parent() {
        let storage = create_test_storage().await;

        let orphan = Collection::new("orphan").with_parent("no-such-parent");
        assert_invalid_edit(storage.create_collection(&orphan).await, "does not exist");
        assert_eq!(storage.count_collections().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reject_dangling_reference() {
        let storage = create_test_storage().await;

        let alias = Collection::new("alias").with_reference("no-such-target");
        assert_invalid_edit(storage.create_collection(&alias).await, "does not exist");
    }

    #[tokio::test]
    async fn test_reject_self_parent() {
        let storage = create_test_storage().await;

        let node = Collection::new("node");
        storage.create_collection(&node).await.unwrap();

        let mut looped = node.clone();
        looped.parent_id = Some(node.id.clone());
        assert_invalid_edit(storage.update_collection(&looped).await, "own parent");
    }

    #[tokio::test]
    async fn test_reject_structural_cycle() {
        let storage = create_test_storage().await;

        let a = Collection::new("a");
        let b = Collection::new("b").with_parent(&a.id);
        let c = Collection::new("c").with_parent(&b.id);
        for node in [&a, &b, &c] {
            storage.create_collection(node).await.unwrap();
        }

        let mut a_under_c = a.clone();
        a_under_c.parent_id = Some(c.id.clone());
        assert_invalid_edit(storage.update_collection(&a_under_c).await, "structural cycle");

        // Rejected edit leaves the row untouched
        let stored = storage.get_collection(&a.id).await.unwrap().unwrap();
        assert!(stored.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_reference_cycles_are_accepted() {
        let storage = create_test_storage().await;

        let a = Collection::new("a");
        let b = Collection::new("b").with_reference(&a.id);
        storage.create_collection(&a).await.unwrap();
        storage.create_collection(&b).await.unwrap();

        let mut a_to_b = a.clone();
        a_to_b.reference = Some(b.id.clone());
        storage.update_collection(&a_to_b).await.unwrap();

        let stored = storage.get_collection(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.reference.as_deref(), Some(b.id.as_str()));
    }

    #[tokio::test]
    async fn test_move_within_tree_is_allowed() {
        let storage = create_test_storage().await;

        let root = Collection::new("root");
        let left = Collection::new("left").with_parent(&root.id);
        let right = Collection::new("right").with_parent(&root.id);
        let leaf = Collection::new("leaf").with_parent(&left.id);
        for node in [&root, &left, &right, &leaf] {
            storage.create_collection(node).await.unwrap();
        }

        let mut moved = leaf.clone();
        moved.parent_id = Some(right.id.clone());
        storage.update_collection(&moved).await.unwrap();

        assert!(storage.get_children(&left.id).await.unwrap().is_empty());
        assert_eq!(storage.get_children(&right.id).await.unwrap()[0].id, leaf.id);
    }
}

#[cfg(test)]
mod deletion_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_leaf() {
        let storage = create_test_storage().await;

        let root = Collection::new("root");
        let leaf = Collection::new("leaf").with_parent(&root.id);
        storage.create_collection(&root).await.unwrap();
        storage.create_collection(&leaf).await.unwrap();

        storage.delete_collection(&leaf.id).await.unwrap();

        assert!(storage.get_collection(&leaf.id).await.unwrap().is_none());
        assert!(storage.get_children(&root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_parent_is_rejected() {
        let storage = create_test_storage().await;

        let root = Collection::new("root");
        let leaf = Collection::new("leaf").with_parent(&root.id);
        storage.create_collection(&root).await.unwrap();
        storage.create_collection(&leaf).await.unwrap();

        assert_invalid_edit(storage.delete_collection(&root.id).await, "child");
        assert!(storage.get_collection(&root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reference_target_is_rejected() {
        let storage = create_test_storage().await;

        let target = Collection::new("target");
        let alias = Collection::new("alias").with_reference(&target.id);
        storage.create_collection(&target).await.unwrap();
        storage.create_collection(&alias).await.unwrap();

        assert_invalid_edit(storage.delete_collection(&target.id).await, "referenced");

        // The alias still resolves
        let alias = storage.get_collection(&alias.id).await.unwrap().unwrap();
        assert_eq!(alias.reference.as_deref(), Some(target.id.as_str()));
    }

    #[tokio::test]
    async fn test_delete_target_after_detaching_alias() {
        let storage = create_test_storage().await;

        let target = Collection::new("target");
        let alias = Collection::new("alias").with_reference(&target.id);
        storage.create_collection(&target).await.unwrap();
        storage.create_collection(&alias).await.unwrap();

        let mut detached = alias.clone();
        detached.reference = None;
        storage.update_collection(&detached).await.unwrap();

        storage.delete_collection(&target.id).await.unwrap();
        assert_eq!(storage.count_collections().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_collection() {
        let storage = create_test_storage().await;

        let result = storage.delete_collection("missing").await;
        assert!(matches!(
            result,
            Err(StorageError::CollectionNotFound { .. })
        ));
    }
}
