//! In-memory doubles for the storage collaborators, used by unit tests that
//! exercise tree or query logic without touching the filesystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::{
    BlockId, IndexKey, IndexValue, Node, NodeStore, Record, RecordError, RecordId, RecordStore,
    TreeError,
};

struct MemoryNodes<K, V> {
    nodes: HashMap<BlockId, Node<K, V>>,
    root: Option<BlockId>,
    next: BlockId,
}

impl<K, V> Default for MemoryNodes<K, V> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            root: None,
            // block 0 is notionally the header, as in the file-backed store
            next: 1,
        }
    }
}

/// Node storage held entirely in memory.
#[derive(Clone)]
pub struct MemoryNodeStore<K, V> {
    inner: Arc<Mutex<MemoryNodes<K, V>>>,
}

impl<K, V> Default for MemoryNodeStore<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryNodes::default())),
        }
    }
}

impl<K, V> MemoryNodeStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, for leak assertions in tests.
    pub fn node_count(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }
}

impl<K: IndexKey, V: IndexValue> NodeStore<K, V> for MemoryNodeStore<K, V> {
    async fn get_root(&self) -> Result<Node<K, V>, TreeError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(id) = inner.root {
            return inner
                .nodes
                .get(&id)
                .cloned()
                .ok_or(TreeError::NodeNotFound(id));
        }

        let id = inner.next;
        inner.next += 1;

        let node = Node::new(id, true);
        inner.nodes.insert(id, node.clone());
        inner.root = Some(id);

        Ok(node)
    }

    async fn make_root(&self, node: &Node<K, V>) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(node.id, node.clone());
        inner.root = Some(node.id);
        Ok(())
    }

    async fn create(&self, is_leaf: bool) -> Result<Node<K, V>, TreeError> {
        let mut inner = self.inner.lock().unwrap();

        let id = inner.next;
        inner.next += 1;

        let node = Node::new(id, is_leaf);
        inner.nodes.insert(id, node.clone());

        Ok(node)
    }

    async fn get(&self, id: BlockId) -> Result<Node<K, V>, TreeError> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(&id)
            .cloned()
            .ok_or(TreeError::NodeNotFound(id))
    }

    async fn save(&self, node: &Node<K, V>) -> Result<(), TreeError> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .insert(node.id, node.clone());
        Ok(())
    }

    async fn delete(&self, node: Node<K, V>) -> Result<(), TreeError> {
        self.inner.lock().unwrap().nodes.remove(&node.id);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryRecords {
    records: HashMap<i64, Record>,
    next: i64,
}

/// Record storage held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<MemoryRecords>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    type Scan = futures_util::stream::Iter<std::vec::IntoIter<Result<Record, RecordError>>>;

    async fn insert(&self, record: Record) -> Result<RecordId, RecordError> {
        let mut inner = self.inner.write().unwrap();

        let id = inner.next;
        inner.next += 1;
        inner.records.insert(id, record);

        Ok(RecordId::new(id))
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>, RecordError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.records.get(&id.raw()).cloned())
    }

    async fn update(&self, id: RecordId, record: Record) -> Result<(), RecordError> {
        let mut inner = self.inner.write().unwrap();

        if !inner.records.contains_key(&id.raw()) {
            return Err(RecordError::NotFound(id));
        }

        inner.records.insert(id.raw(), record);
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<(), RecordError> {
        let mut inner = self.inner.write().unwrap();

        match inner.records.remove(&id.raw()) {
            Some(_) => Ok(()),
            None => Err(RecordError::NotFound(id)),
        }
    }

    fn scan(&self) -> Result<Self::Scan, RecordError> {
        let inner = self.inner.read().unwrap();

        let mut snapshot: Vec<_> = inner.records.iter().collect();
        snapshot.sort_by_key(|(id, _)| **id);

        let items: Vec<_> = snapshot
            .into_iter()
            .map(|(_, record)| Ok(record.clone()))
            .collect();

        Ok(futures_util::stream::iter(items))
    }
}
