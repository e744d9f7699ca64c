use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BLOCK_SIZE: u32 = 8192;
pub const DEFAULT_DEGREE: usize = 3;
pub const DEFAULT_WRITE_QUEUE: usize = 1000;
pub const DEFAULT_NODE_CACHE: usize = 128;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoreConfig {
    /// File backing the store.
    pub path: PathBuf,

    /// Size in bytes of each storage block. Fixed at store creation; on
    /// reopen the header value wins.
    pub block_size: Option<u32>,

    /// Minimum degree of the B-tree. Must be at least 2.
    pub degree: Option<usize>,

    /// Capacity of the write-behind queue.
    pub write_queue: Option<usize>,

    /// Number of recently used nodes the node manager keeps in memory.
    pub node_cache: Option<usize>,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_size: None,
            degree: None,
            write_queue: None,
            node_cache: None,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    pub fn degree(&self) -> usize {
        self.degree.unwrap_or(DEFAULT_DEGREE)
    }

    pub fn write_queue(&self) -> usize {
        self.write_queue.unwrap_or(DEFAULT_WRITE_QUEUE)
    }

    pub fn node_cache(&self) -> usize {
        self.node_cache.unwrap_or(DEFAULT_NODE_CACHE)
    }
}
