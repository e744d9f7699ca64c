use burrow_core::{BlockId, IndexKey, IndexValue, Node, NodeStore, TreeError};

use super::{lower_bound, upper_bound, BTree};

impl<K, V, S> BTree<K, V, S>
where
    K: IndexKey,
    V: IndexValue,
    S: NodeStore<K, V>,
{
    /// Deletes one association matching the pair. Returns whether a match
    /// was found and removed.
    ///
    /// Single top-down pass: every child is brought up to at least `t`
    /// keys before the descent enters it, so no backtracking is ever
    /// needed. An entry found in an internal node is replaced by its
    /// in-order predecessor (or successor, or merged away) and the descent
    /// continues after the replacement pair.
    pub async fn delete(&self, key: &K, value: &V) -> Result<bool, TreeError> {
        let _permit = self.permit.lock().await;

        let root = self.store.get_root().await?;

        if root.is_leaf && root.is_empty() {
            return Ok(false);
        }

        let mut target_key = key.clone();
        let mut target_value = value.clone();
        let mut node = root;

        loop {
            let lo = lower_bound(&node.keys, &target_key);
            let hi = upper_bound(&node.keys, &target_key);
            let slot = (lo..hi).find(|at| node.values[*at] == target_value);

            if let Some(at) = slot {
                if node.is_leaf {
                    node.keys.remove(at);
                    node.values.remove(at);
                    self.store.save(&node).await?;
                    return Ok(true);
                }

                let left = self.store.get(node.children[at]).await?;

                if left.len() >= self.degree {
                    let (swap_key, swap_value) = self.rightmost_pair(&left).await?;
                    node.keys[at] = swap_key.clone();
                    node.values[at] = swap_value.clone();
                    self.store.save(&node).await?;

                    target_key = swap_key;
                    target_value = swap_value;
                    node = left;
                    continue;
                }

                let right = self.store.get(node.children[at + 1]).await?;

                if right.len() >= self.degree {
                    let (swap_key, swap_value) = self.leftmost_pair(&right).await?;
                    node.keys[at] = swap_key.clone();
                    node.values[at] = swap_value.clone();
                    self.store.save(&node).await?;

                    target_key = swap_key;
                    target_value = swap_value;
                    node = right;
                    continue;
                }

                // both children are minimal: pull the separator down and
                // keep hunting the pair inside the merged child
                let merged = self.merge_children(&mut node, at, left, right).await?;

                if node.is_empty() {
                    // only the root may run out of keys; promote the child
                    self.store.make_root(&merged).await?;
                    self.store.delete(node).await?;
                }

                node = merged;
                continue;
            }

            if node.is_leaf {
                return Ok(false);
            }

            // the pair is not in this node; rebalancing rotations can move
            // duplicates to either side of an equal separator, so probe
            // every candidate subtree across the equal-key window
            let mut chosen = None;
            for candidate in lo..=hi {
                if self
                    .subtree_contains(node.children[candidate], &target_key, &target_value)
                    .await?
                {
                    chosen = Some(candidate);
                    break;
                }
            }

            let Some(at) = chosen else {
                return Ok(false);
            };

            let child = self.store.get(node.children[at]).await?;

            if child.len() > self.min_keys() {
                node = child;
                continue;
            }

            self.fill_child(&mut node, at).await?;

            if !node.is_leaf && node.is_empty() {
                // the fill merged away the root's last separator
                let survivor = self.store.get(node.children[0]).await?;
                self.store.make_root(&survivor).await?;
                self.store.delete(node).await?;
                node = survivor;
            }

            // re-resolve against the updated layout
        }
    }

    /// Rightmost (key, value) pair of the subtree under `from`.
    async fn rightmost_pair(&self, from: &Node<K, V>) -> Result<(K, V), TreeError> {
        let mut node = from.clone();

        loop {
            if node.is_leaf {
                let last = node.len() - 1;
                return Ok((node.keys[last].clone(), node.values[last].clone()));
            }

            let next = node.children[node.len()];
            node = self.store.get(next).await?;
        }
    }

    /// Leftmost (key, value) pair of the subtree under `from`.
    async fn leftmost_pair(&self, from: &Node<K, V>) -> Result<(K, V), TreeError> {
        let mut node = from.clone();

        loop {
            if node.is_leaf {
                return Ok((node.keys[0].clone(), node.values[0].clone()));
            }

            let next = node.children[0];
            node = self.store.get(next).await?;
        }
    }

    /// Read-only probe for a pair below `root`, constrained to the
    /// equal-key corridor.
    async fn subtree_contains(
        &self,
        root: BlockId,
        key: &K,
        value: &V,
    ) -> Result<bool, TreeError> {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let node = self.store.get(id).await?;

            let lo = lower_bound(&node.keys, key);
            let hi = upper_bound(&node.keys, key);

            if (lo..hi).any(|at| &node.values[at] == value) {
                return Ok(true);
            }

            if !node.is_leaf {
                stack.extend(node.children[lo..=hi].iter().copied());
            }
        }

        Ok(false)
    }

    /// Brings child `at` of `parent` up to at least `t` keys, borrowing
    /// from a richer sibling or merging with a minimal one (left sibling
    /// preferred in both cases).
    async fn fill_child(&self, parent: &mut Node<K, V>, at: usize) -> Result<(), TreeError> {
        let t = self.degree;

        if at > 0 {
            let left = self.store.get(parent.children[at - 1]).await?;
            if left.len() >= t {
                return self.borrow_from_left(parent, at, left).await;
            }
        }

        if at < parent.len() {
            let right = self.store.get(parent.children[at + 1]).await?;
            if right.len() >= t {
                return self.borrow_from_right(parent, at, right).await;
            }
        }

        if at > 0 {
            let left = self.store.get(parent.children[at - 1]).await?;
            let child = self.store.get(parent.children[at]).await?;
            self.merge_children(parent, at - 1, left, child).await?;
        } else {
            let child = self.store.get(parent.children[at]).await?;
            let right = self.store.get(parent.children[at + 1]).await?;
            self.merge_children(parent, at, child, right).await?;
        }

        Ok(())
    }

    /// Rotates the separator left of `at` into the child's front and the
    /// left sibling's last pair up into the separator slot.
    async fn borrow_from_left(
        &self,
        parent: &mut Node<K, V>,
        at: usize,
        mut left: Node<K, V>,
    ) -> Result<(), TreeError> {
        let mut child = self.store.get(parent.children[at]).await?;
        let sep = at - 1;

        child.keys.insert(0, parent.keys[sep].clone());
        child.values.insert(0, parent.values[sep].clone());

        let last = left.len() - 1;
        parent.keys[sep] = left.keys[last].clone();
        parent.values[sep] = left.values[last].clone();
        left.keys.truncate(last);
        left.values.truncate(last);

        if !child.is_leaf {
            if let Some(moved) = left.children.pop() {
                child.children.insert(0, moved);
            }
        }

        self.store.save(&left).await?;
        self.store.save(&child).await?;
        self.store.save(parent).await?;

        Ok(())
    }

    /// Mirror of [`Self::borrow_from_left`].
    async fn borrow_from_right(
        &self,
        parent: &mut Node<K, V>,
        at: usize,
        mut right: Node<K, V>,
    ) -> Result<(), TreeError> {
        let mut child = self.store.get(parent.children[at]).await?;
        let sep = at;

        child.keys.push(parent.keys[sep].clone());
        child.values.push(parent.values[sep].clone());

        parent.keys[sep] = right.keys.remove(0);
        parent.values[sep] = right.values.remove(0);

        if !child.is_leaf {
            child.children.push(right.children.remove(0));
        }

        self.store.save(&right).await?;
        self.store.save(&child).await?;
        self.store.save(parent).await?;

        Ok(())
    }

    /// Folds the separator at `sep` and the right child into the left
    /// child, shrinking the parent by one key and one child. The right
    /// child's block is freed.
    async fn merge_children(
        &self,
        parent: &mut Node<K, V>,
        sep: usize,
        mut left: Node<K, V>,
        right: Node<K, V>,
    ) -> Result<Node<K, V>, TreeError> {
        left.keys.push(parent.keys.remove(sep));
        left.values.push(parent.values.remove(sep));
        parent.children.remove(sep + 1);

        left.keys.extend(right.keys.iter().cloned());
        left.values.extend(right.values.iter().cloned());
        left.children.extend(right.children.iter().copied());

        self.store.save(&left).await?;
        self.store.save(parent).await?;
        self.store.delete(right).await?;

        Ok(left)
    }
}
