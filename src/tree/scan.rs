use std::ops::Bound;

use async_stream::stream;
use futures_core::Stream;

use burrow_core::{BlockId, IndexKey, IndexValue, NodeStore, TreeError};

use super::{lower_bound, upper_bound, BTree};

enum Step<V> {
    Node(BlockId),
    Emit(V),
}

/// Window of qualifying key positions in one node, given the range bounds.
fn window<K: Ord>(keys: &[K], lower: &Bound<K>, upper: &Bound<K>) -> (usize, usize) {
    let lo = match lower {
        Bound::Unbounded => 0,
        Bound::Included(key) => lower_bound(keys, key),
        Bound::Excluded(key) => upper_bound(keys, key),
    };

    let hi = match upper {
        Bound::Unbounded => keys.len(),
        Bound::Included(key) => upper_bound(keys, key),
        Bound::Excluded(key) => lower_bound(keys, key),
    };

    (lo, hi.max(lo))
}

impl<K, V, S> BTree<K, V, S>
where
    K: IndexKey,
    V: IndexValue,
    S: NodeStore<K, V>,
{
    /// All values stored under `key`, lazily, in node insertion order.
    pub fn find(&self, key: K) -> impl Stream<Item = Result<V, TreeError>> + Send + 'static {
        self.find_range(Bound::Included(key.clone()), Bound::Included(key))
    }

    /// Values whose keys fall within the bounds, in ascending key order.
    ///
    /// Constrained in-order traversal: left of the first qualifying key,
    /// then each qualifying entry followed by the child to its right. The
    /// stream owns a store handle, so it stays valid independently of the
    /// tree value it was created from.
    pub fn find_range(
        &self,
        lower: Bound<K>,
        upper: Bound<K>,
    ) -> impl Stream<Item = Result<V, TreeError>> + Send + 'static {
        let store = self.store.clone();

        stream! {
            let root = match store.get_root().await {
                Ok(root) => root,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            let mut stack = vec![Step::Node(root.id)];

            while let Some(step) = stack.pop() {
                let id = match step {
                    Step::Emit(value) => {
                        yield Ok(value);
                        continue;
                    }
                    Step::Node(id) => id,
                };

                let node = match store.get(id).await {
                    Ok(node) => node,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                };

                let (lo, hi) = window(&node.keys, &lower, &upper);

                // push the in-order walk reversed so pops run left to right
                if node.is_leaf {
                    for at in (lo..hi).rev() {
                        stack.push(Step::Emit(node.values[at].clone()));
                    }
                } else {
                    stack.push(Step::Node(node.children[hi]));

                    for at in (lo..hi).rev() {
                        stack.push(Step::Emit(node.values[at].clone()));
                        stack.push(Step::Node(node.children[at]));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use burrow_core::testing::MemoryNodeStore;
    use futures_util::{pin_mut, StreamExt};

    use super::*;

    async fn tree(degree: usize) -> BTree<i64, i64, MemoryNodeStore<i64, i64>> {
        BTree::open(MemoryNodeStore::new(), degree).await.unwrap()
    }

    async fn collect(stream: impl Stream<Item = Result<i64, TreeError>>) -> Vec<i64> {
        pin_mut!(stream);

        let mut out = Vec::new();
        while let Some(next) = stream.next().await {
            out.push(next.unwrap());
        }

        out
    }

    #[tokio::test]
    async fn point_lookup_finds_all_and_only_matches() {
        let tree = tree(3).await;

        for key in [1i64, 3, 5, 2, 4] {
            tree.insert(key, key * 100).await.unwrap();
        }

        assert_eq!(collect(tree.find(3)).await, vec![300]);
        assert_eq!(collect(tree.find(9)).await, Vec::<i64>::new());
    }

    #[tokio::test]
    async fn range_respects_every_inclusivity_combination() {
        let tree = tree(2).await;

        for key in 1..=10 {
            tree.insert(key, key).await.unwrap();
        }

        let cases: [(Bound<i64>, Bound<i64>, &[i64]); 6] = [
            (Bound::Included(3), Bound::Included(7), &[3, 4, 5, 6, 7]),
            (Bound::Included(3), Bound::Excluded(7), &[3, 4, 5, 6]),
            (Bound::Excluded(3), Bound::Included(7), &[4, 5, 6, 7]),
            (Bound::Excluded(3), Bound::Excluded(7), &[4, 5, 6]),
            (Bound::Unbounded, Bound::Excluded(4), &[1, 2, 3]),
            (Bound::Included(8), Bound::Unbounded, &[8, 9, 10]),
        ];

        for (lower, upper, expected) in cases {
            let got = collect(tree.find_range(lower.clone(), upper.clone())).await;
            assert_eq!(got, expected, "{lower:?}..{upper:?}");
        }
    }

    #[tokio::test]
    async fn full_range_streams_everything_in_order() {
        let tree = tree(2).await;

        for key in [9i64, 1, 8, 2, 7, 3, 6, 4, 5, 10] {
            tree.insert(key, key).await.unwrap();
        }

        assert_eq!(
            collect(tree.find_range(Bound::Unbounded, Bound::Unbounded)).await,
            (1..=10).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn empty_and_disjoint_ranges_stream_nothing() {
        let tree = tree(3).await;

        for key in 1..=5 {
            tree.insert(key, key).await.unwrap();
        }

        assert!(collect(tree.find_range(Bound::Included(8), Bound::Included(9)))
            .await
            .is_empty());

        // inverted bounds collapse to an empty window
        assert!(collect(tree.find_range(Bound::Included(4), Bound::Included(2)))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn duplicates_stream_newest_first_within_a_key() {
        let tree = tree(3).await;

        tree.insert(2, 20).await.unwrap();
        tree.insert(1, 11).await.unwrap();
        tree.insert(1, 12).await.unwrap();
        tree.insert(1, 13).await.unwrap();
        tree.insert(3, 30).await.unwrap();

        assert_eq!(collect(tree.find(1)).await, vec![13, 12, 11]);
        assert_eq!(
            collect(tree.find_range(Bound::Included(1), Bound::Included(2))).await,
            vec![13, 12, 11, 20]
        );
    }

    #[tokio::test]
    async fn duplicates_spanning_nodes_are_all_found() {
        let tree = tree(2).await;

        for tick in 0..16 {
            tree.insert(5, tick).await.unwrap();
        }
        tree.insert(1, 100).await.unwrap();
        tree.insert(9, 900).await.unwrap();

        let hits = collect(tree.find(5)).await;
        assert_eq!(hits.len(), 16);

        let mut sorted = hits.clone();
        sorted.sort();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn min_and_max_track_the_extremes() {
        let tree = tree(3).await;

        assert!(matches!(tree.min_key().await, Err(TreeError::EmptyIndex)));
        assert!(matches!(tree.max_key().await, Err(TreeError::EmptyIndex)));

        for key in [4i64, 9, 1, 7, 3] {
            tree.insert(key, key).await.unwrap();
        }

        assert_eq!(tree.min_key().await.unwrap(), 1);
        assert_eq!(tree.max_key().await.unwrap(), 9);
    }
}
