use burrow_core::{IndexKey, IndexValue, Node, NodeStore, TreeError};

use super::{lower_bound, BTree};

impl<K, V, S> BTree<K, V, S>
where
    K: IndexKey,
    V: IndexValue,
    S: NodeStore<K, V>,
{
    /// Inserts the pair, splitting full nodes on the way down so the
    /// descent never has to back up.
    pub async fn insert(&self, key: K, value: V) -> Result<(), TreeError> {
        let _permit = self.permit.lock().await;

        let mut root = self.store.get_root().await?;

        if root.len() == self.max_keys() {
            let mut new_root = self.store.create(false).await?;
            new_root.children.push(root.id);
            self.split_child(&mut new_root, 0, &mut root).await?;
            self.store.make_root(&new_root).await?;
            root = new_root;
        }

        self.insert_non_full(root, key, value).await
    }

    async fn insert_non_full(
        &self,
        mut node: Node<K, V>,
        key: K,
        value: V,
    ) -> Result<(), TreeError> {
        loop {
            if node.is_leaf {
                // duplicates land in front of their equals
                let at = lower_bound(&node.keys, &key);
                node.keys.insert(at, key);
                node.values.insert(at, value);
                return self.store.save(&node).await;
            }

            // ties descend left
            let mut at = lower_bound(&node.keys, &key);
            let mut child = self.store.get(node.children[at]).await?;

            if child.len() == self.max_keys() {
                self.split_child(&mut node, at, &mut child).await?;

                // re-select the side against the promoted median
                if key > node.keys[at] {
                    at += 1;
                }

                child = self.store.get(node.children[at]).await?;
            }

            node = child;
        }
    }

    /// Moves the upper half of a full `child` into a fresh sibling and
    /// promotes the median into `parent` at position `at`. All three nodes
    /// are saved before returning.
    async fn split_child(
        &self,
        parent: &mut Node<K, V>,
        at: usize,
        child: &mut Node<K, V>,
    ) -> Result<(), TreeError> {
        let t = self.degree;

        let mut sibling = self.store.create(child.is_leaf).await?;

        let median_key = child.keys[t - 1].clone();
        let median_value = child.values[t - 1].clone();

        sibling.keys = child.keys.split_off(t);
        sibling.values = child.values.split_off(t);
        child.keys.truncate(t - 1);
        child.values.truncate(t - 1);

        if !child.is_leaf {
            sibling.children = child.children.split_off(t);
        }

        parent.keys.insert(at, median_key);
        parent.values.insert(at, median_value);
        parent.children.insert(at + 1, sibling.id);

        self.store.save(child).await?;
        self.store.save(&sibling).await?;
        self.store.save(parent).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use burrow_core::testing::MemoryNodeStore;

    use crate::tree::audit;

    use super::*;

    async fn tree(degree: usize) -> BTree<i64, i64, MemoryNodeStore<i64, i64>> {
        BTree::open(MemoryNodeStore::new(), degree).await.unwrap()
    }

    #[tokio::test]
    async fn degree_must_be_at_least_two() {
        let result = BTree::<i64, i64, _>::open(MemoryNodeStore::new(), 1).await;
        assert!(matches!(result, Err(TreeError::BadDegree(1))));
    }

    #[tokio::test]
    async fn ascending_run_stays_balanced() {
        let tree = tree(3).await;

        for key in 1..=20 {
            tree.insert(key, key * 10).await.unwrap();
            audit::check(&tree).await;
        }

        let stats = tree.stats().await.unwrap();
        assert_eq!(stats.key_count, 20);
        assert_eq!(stats.max_depth, 2);

        let pairs = audit::check(&tree).await;
        let keys: Vec<_> = pairs.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn descending_run_stays_balanced() {
        let tree = tree(2).await;

        for key in (1..=50).rev() {
            tree.insert(key, key).await.unwrap();
            audit::check(&tree).await;
        }

        let pairs = audit::check(&tree).await;
        assert_eq!(pairs.len(), 50);
    }

    #[tokio::test]
    async fn root_split_promotes_the_median() {
        let tree = tree(2).await;

        for key in [10, 20, 30, 40] {
            tree.insert(key, key).await.unwrap();
        }

        let root = tree.store.get_root().await.unwrap();
        assert!(!root.is_leaf);
        assert_eq!(root.keys, vec![20]);
        assert_eq!(root.children.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_keys_pile_up_in_front() {
        let tree = tree(3).await;

        tree.insert(1, 10).await.unwrap();
        tree.insert(1, 11).await.unwrap();
        tree.insert(1, 12).await.unwrap();

        let pairs = audit::check(&tree).await;
        let values: Vec<_> = pairs.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec![12, 11, 10]);
    }

    #[tokio::test]
    async fn interleaved_inserts_hold_invariants() {
        let tree = tree(2).await;

        let keys = [5, 2, 8, 1, 3, 7, 9, 4, 6, 5, 5, 2, 10, 0, 8];

        for (tick, key) in keys.into_iter().enumerate() {
            tree.insert(key, tick as i64).await.unwrap();
            audit::check(&tree).await;
        }

        let pairs = audit::check(&tree).await;
        assert_eq!(pairs.len(), keys.len());
    }
}
