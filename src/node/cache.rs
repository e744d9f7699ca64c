use std::collections::{HashMap, VecDeque};

use burrow_core::{BlockId, Node, WriteSeq};

struct Entry<K, V> {
    node: Node<K, V>,
    /// Sequence of the write that produced this entry, 0 for entries loaded
    /// straight from the file.
    written: WriteSeq,
}

/// Bounded node cache with least-recently-used eviction.
///
/// An entry whose block write the drainer has not yet processed is pinned:
/// evicting it would let a direct file read observe stale bytes, since
/// reads bypass the write queue.
pub(crate) struct NodeCache<K, V> {
    capacity: usize,
    entries: HashMap<BlockId, Entry<K, V>>,
    order: VecDeque<BlockId>,
}

impl<K: Clone, V: Clone> NodeCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, id: BlockId) -> Option<Node<K, V>> {
        let node = self.entries.get(&id).map(|entry| entry.node.clone())?;
        self.touch(id);
        Some(node)
    }

    /// Inserts an entry loaded from the file.
    pub fn put_clean(&mut self, node: Node<K, V>, drained: WriteSeq) {
        self.put(node, 0, drained);
    }

    /// Inserts an entry whose write was just submitted with `seq`.
    pub fn put_written(&mut self, node: Node<K, V>, seq: WriteSeq, drained: WriteSeq) {
        self.put(node, seq, drained);
    }

    fn put(&mut self, node: Node<K, V>, written: WriteSeq, drained: WriteSeq) {
        let id = node.id;

        if self.entries.insert(id, Entry { node, written }).is_none() {
            self.order.push_back(id);
        } else {
            self.touch(id);
        }

        self.evict(drained);
    }

    pub fn remove(&mut self, id: BlockId) {
        self.entries.remove(&id);
        self.order.retain(|held| *held != id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn touch(&mut self, id: BlockId) {
        self.order.retain(|held| *held != id);
        self.order.push_back(id);
    }

    /// Evicts least-recently-used entries down to capacity, skipping any
    /// the drainer has not caught up with.
    fn evict(&mut self, drained: WriteSeq) {
        let mut budget = self.order.len();

        while self.entries.len() > self.capacity && budget > 0 {
            budget -= 1;

            let Some(id) = self.order.pop_front() else {
                break;
            };

            match self.entries.get(&id) {
                Some(entry) if entry.written > drained => self.order.push_back(id),
                Some(_) => {
                    self.entries.remove(&id);
                }
                None => {}
            }
        }
    }
}
