//! Node manager: maps tree nodes onto blocks of a [`BlockStore`].
//!
//! Every node occupies exactly one block. Saves update the in-memory cache
//! before the block write is enqueued and reads consult the cache first,
//! which is what gives the single writer read-your-write consistency over
//! the asynchronous pipeline.

mod cache;
mod codec;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use burrow_core::{
    BlockId, IndexKey, IndexValue, Node, NodeStore, StoreConfig, TreeError, WriteSeq,
};

use crate::block::BlockStore;

use cache::NodeCache;

/// File-backed implementation of [`NodeStore`].
pub struct BlockNodeStore<K, V> {
    store: BlockStore,
    cache: Arc<Mutex<NodeCache<K, V>>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for BlockNodeStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K: IndexKey, V: IndexValue> BlockNodeStore<K, V> {
    pub async fn open(config: &StoreConfig, cancel: CancellationToken) -> Result<Self, TreeError> {
        let store = BlockStore::open(config, cancel).await?;
        Ok(Self::over(store, config.node_cache()))
    }

    /// Wraps an already opened block store.
    pub fn over(store: BlockStore, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: Arc::new(Mutex::new(NodeCache::new(cache_capacity))),
            _marker: PhantomData,
        }
    }

    pub fn block_store(&self) -> &BlockStore {
        &self.store
    }

    pub async fn flush(&self) -> Result<(), TreeError> {
        self.store.flush().await.map_err(TreeError::from)
    }

    pub async fn close(&self) -> Result<(), TreeError> {
        self.store.close().await.map_err(TreeError::from)
    }

    fn cache_get(&self, id: BlockId) -> Result<Option<Node<K, V>>, TreeError> {
        let mut cache = self.cache.lock().map_err(|_| TreeError::LockPoisoned)?;
        Ok(cache.get(id))
    }

    fn cache_put_clean(&self, node: Node<K, V>) -> Result<(), TreeError> {
        let drained = self.store.drained();
        let mut cache = self.cache.lock().map_err(|_| TreeError::LockPoisoned)?;
        cache.put_clean(node, drained);
        Ok(())
    }

    fn cache_put_written(&self, node: Node<K, V>, seq: WriteSeq) -> Result<(), TreeError> {
        let drained = self.store.drained();
        let mut cache = self.cache.lock().map_err(|_| TreeError::LockPoisoned)?;
        cache.put_written(node, seq, drained);
        Ok(())
    }

    fn cache_remove(&self, id: BlockId) -> Result<(), TreeError> {
        let mut cache = self.cache.lock().map_err(|_| TreeError::LockPoisoned)?;
        cache.remove(id);
        Ok(())
    }
}

impl<K: IndexKey, V: IndexValue> NodeStore<K, V> for BlockNodeStore<K, V> {
    async fn get_root(&self) -> Result<Node<K, V>, TreeError> {
        match self.store.root_id()? {
            Some(id) => self.get(id).await,
            None => {
                let root = self.create(true).await?;
                self.store.set_root(Some(root.id)).await?;
                Ok(root)
            }
        }
    }

    async fn make_root(&self, node: &Node<K, V>) -> Result<(), TreeError> {
        self.store.set_root(Some(node.id)).await?;
        Ok(())
    }

    async fn create(&self, is_leaf: bool) -> Result<Node<K, V>, TreeError> {
        let id = self.store.allocate().await?;
        let node = Node::new(id, is_leaf);
        self.save(&node).await?;
        Ok(node)
    }

    async fn get(&self, id: BlockId) -> Result<Node<K, V>, TreeError> {
        if let Some(node) = self.cache_get(id)? {
            return Ok(node);
        }

        let raw = self.store.read(id).await?;
        let node = codec::decode_node(id, &raw)?;
        self.cache_put_clean(node.clone())?;

        Ok(node)
    }

    async fn save(&self, node: &Node<K, V>) -> Result<(), TreeError> {
        let payload = codec::encode_node(node, self.store.block_size() as usize)?;
        let seq = self.store.write(node.id, payload).await?;
        self.cache_put_written(node.clone(), seq)?;
        Ok(())
    }

    async fn delete(&self, node: Node<K, V>) -> Result<(), TreeError> {
        self.cache_remove(node.id)?;
        self.store.free(node.id).await?;
        Ok(())
    }
}
