//! End-to-end index scenarios over real files: degree 3, 4 KiB blocks.

use std::ops::Bound;

use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;

use burrow::prelude::*;
use burrow::{BTree, BlockNodeStore};

type FileIndex = BTree<i64, RecordId, BlockNodeStore<i64, RecordId>>;

fn test_config(dir: &tempfile::TempDir, name: &str) -> StoreConfig {
    let mut config = StoreConfig::new(dir.path().join(name));
    config.block_size = Some(4096);
    config.degree = Some(3);
    config
}

async fn open_index(config: &StoreConfig) -> (FileIndex, BlockNodeStore<i64, RecordId>) {
    let nodes = BlockNodeStore::open(config, CancellationToken::new())
        .await
        .unwrap();
    let tree = BTree::open(nodes.clone(), config.degree()).await.unwrap();
    (tree, nodes)
}

async fn values(stream: impl Stream<Item = Result<RecordId, TreeError>>) -> Vec<i64> {
    pin_mut!(stream);

    let mut out = Vec::new();
    while let Some(next) = stream.next().await {
        out.push(next.unwrap().raw());
    }

    out
}

#[tokio::test]
async fn point_and_range_over_unsorted_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, nodes) = open_index(&test_config(&dir, "s1.idx")).await;

    for (key, value) in [(1, 100), (3, 300), (5, 500), (2, 200), (4, 400)] {
        tree.insert(key, RecordId::new(value)).await.unwrap();
    }

    assert_eq!(
        values(tree.find_range(Bound::Included(2), Bound::Included(4))).await,
        vec![200, 300, 400]
    );
    assert_eq!(tree.min_key().await.unwrap(), 1);
    assert_eq!(tree.max_key().await.unwrap(), 5);

    nodes.close().await.unwrap();
}

#[tokio::test]
async fn ascending_run_splits_to_depth_two() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, nodes) = open_index(&test_config(&dir, "s2.idx")).await;

    for key in 1..=20i64 {
        tree.insert(key, RecordId::new(key * 10)).await.unwrap();
    }

    let stats = tree.stats().await.unwrap();
    assert_eq!(stats.key_count, 20);
    assert_eq!(stats.max_depth, 2);

    assert_eq!(values(tree.find(13)).await, vec![130]);
    assert_eq!(
        values(tree.find_range(Bound::Included(8), Bound::Excluded(15))).await,
        vec![80, 90, 100, 110, 120, 130, 140]
    );

    nodes.close().await.unwrap();
}

#[tokio::test]
async fn deletes_rebalance_and_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, nodes) = open_index(&test_config(&dir, "s3.idx")).await;

    for key in [5i64, 2, 8, 1, 3, 7, 9, 4, 6] {
        tree.insert(key, RecordId::new(key * 10)).await.unwrap();
    }

    for (key, value) in [(5i64, 50), (8, 80), (1, 10)] {
        assert!(tree.delete(&key, &RecordId::new(value)).await.unwrap());
    }

    assert_eq!(
        values(tree.find_range(Bound::Unbounded, Bound::Unbounded)).await,
        vec![20, 30, 40, 60, 70, 90]
    );
    assert_eq!(tree.min_key().await.unwrap(), 2);
    assert_eq!(tree.max_key().await.unwrap(), 9);

    nodes.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_keys_delete_one_association_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, nodes) = open_index(&test_config(&dir, "s4.idx")).await;

    tree.insert(1, RecordId::new(10)).await.unwrap();
    tree.insert(1, RecordId::new(11)).await.unwrap();
    tree.insert(1, RecordId::new(12)).await.unwrap();

    // newest association first
    assert_eq!(values(tree.find(1)).await, vec![12, 11, 10]);

    assert!(tree.delete(&1, &RecordId::new(11)).await.unwrap());
    assert_eq!(values(tree.find(1)).await, vec![12, 10]);

    // second delete of the same pair is a miss and changes nothing
    assert!(!tree.delete(&1, &RecordId::new(11)).await.unwrap());
    assert_eq!(values(tree.find(1)).await, vec![12, 10]);

    nodes.close().await.unwrap();
}

#[tokio::test]
async fn index_survives_teardown_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, "s5.idx");

    {
        let (tree, nodes) = open_index(&config).await;

        for key in [5i64, 2, 8, 1, 3, 7, 9, 4, 6] {
            tree.insert(key, RecordId::new(key * 10)).await.unwrap();
        }

        for (key, value) in [(5i64, 50), (8, 80), (1, 10)] {
            assert!(tree.delete(&key, &RecordId::new(value)).await.unwrap());
        }

        nodes.close().await.unwrap();
    }

    let (tree, nodes) = open_index(&config).await;

    assert_eq!(
        values(tree.find_range(Bound::Unbounded, Bound::Unbounded)).await,
        vec![20, 30, 40, 60, 70, 90]
    );
    assert_eq!(tree.min_key().await.unwrap(), 2);
    assert_eq!(tree.max_key().await.unwrap(), 9);

    // the reopened index accepts further mutations
    tree.insert(5, RecordId::new(51)).await.unwrap();
    assert_eq!(values(tree.find(5)).await, vec![51]);

    nodes.close().await.unwrap();
}

#[tokio::test]
async fn closed_index_refuses_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, nodes) = open_index(&test_config(&dir, "closed.idx")).await;

    tree.insert(1, RecordId::new(10)).await.unwrap();
    nodes.close().await.unwrap();

    let result = tree.insert(2, RecordId::new(20)).await;
    assert!(matches!(
        result,
        Err(TreeError::Store(StoreError::Disposed))
    ));
}

#[tokio::test]
async fn bulk_workload_roundtrips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, "bulk.idx");

    {
        let (tree, nodes) = open_index(&config).await;

        for key in 0..400i64 {
            tree.insert(key % 100, RecordId::new(key)).await.unwrap();
        }

        // drop every pair with an odd value again
        for key in (1..400i64).step_by(2) {
            assert!(tree.delete(&(key % 100), &RecordId::new(key)).await.unwrap());
        }

        nodes.close().await.unwrap();
    }

    let (tree, nodes) = open_index(&config).await;

    let all = values(tree.find_range(Bound::Unbounded, Bound::Unbounded)).await;
    assert_eq!(all.len(), 200);
    assert!(all.iter().all(|value| value % 2 == 0));

    let stats = tree.stats().await.unwrap();
    assert_eq!(stats.key_count, 200);

    nodes.close().await.unwrap();
}
