//! Disk-backed B-tree index.
//!
//! Minimum degree `t`: every node except the root holds between `t - 1`
//! and `2t - 1` keys. Keys are kept in ascending order with duplicates
//! allowed; values ride along positionally. Mutations take a single
//! exclusive permit for their whole run; lookups and scans never do, so
//! they may observe the tree before or after a concurrent mutation but
//! never a torn node.
//!
//! A mutation interrupted by cancellation after its first save may leave
//! the tree partially updated; treat the index as corrupt in that case.

mod delete;
mod insert;
mod scan;

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::Mutex;

use burrow_core::{IndexKey, IndexValue, NodeStore, TreeError};

/// First position whose key is not less than `key`.
pub(crate) fn lower_bound<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|probe| probe < key)
}

/// First position whose key is greater than `key`.
pub(crate) fn upper_bound<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|probe| probe <= key)
}

pub struct BTree<K, V, S> {
    pub(crate) store: S,
    pub(crate) degree: usize,
    pub(crate) permit: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S: Clone> Clone for BTree<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            degree: self.degree,
            permit: self.permit.clone(),
            _marker: PhantomData,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TreeStats {
    pub key_count: u64,
    pub node_count: u32,
    pub max_depth: u32,
}

impl<K, V, S> BTree<K, V, S>
where
    K: IndexKey,
    V: IndexValue,
    S: NodeStore<K, V>,
{
    /// Opens the index over `store`, materializing the empty root so that
    /// lookups never have to mutate storage.
    pub async fn open(store: S, degree: usize) -> Result<Self, TreeError> {
        if degree < 2 {
            return Err(TreeError::BadDegree(degree));
        }

        store.get_root().await?;

        Ok(Self {
            store,
            degree,
            permit: Arc::new(Mutex::new(())),
            _marker: PhantomData,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub(crate) fn max_keys(&self) -> usize {
        2 * self.degree - 1
    }

    pub(crate) fn min_keys(&self) -> usize {
        self.degree - 1
    }

    /// Smallest key in the index.
    pub async fn min_key(&self) -> Result<K, TreeError> {
        let mut node = self.store.get_root().await?;

        if node.is_leaf && node.is_empty() {
            return Err(TreeError::EmptyIndex);
        }

        loop {
            if node.is_leaf {
                return Ok(node.keys[0].clone());
            }

            node = self.store.get(node.children[0]).await?;
        }
    }

    /// Largest key in the index.
    pub async fn max_key(&self) -> Result<K, TreeError> {
        let mut node = self.store.get_root().await?;

        if node.is_leaf && node.is_empty() {
            return Err(TreeError::EmptyIndex);
        }

        loop {
            if node.is_leaf {
                return Ok(node.keys[node.len() - 1].clone());
            }

            node = self.store.get(node.children[node.len()]).await?;
        }
    }

    /// Breadth-first walk over the whole tree.
    pub async fn stats(&self) -> Result<TreeStats, TreeError> {
        let root = self.store.get_root().await?;

        let mut queue = VecDeque::from([(root.id, 1u32)]);
        let mut stats = TreeStats::default();

        while let Some((id, depth)) = queue.pop_front() {
            let node = self.store.get(id).await?;

            stats.node_count += 1;
            stats.key_count += node.len() as u64;
            stats.max_depth = stats.max_depth.max(depth);

            for child in &node.children {
                queue.push_back((*child, depth + 1));
            }
        }

        Ok(stats)
    }
}
