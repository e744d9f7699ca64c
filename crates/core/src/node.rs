use crate::{BlockId, Codec, TreeError};

/// Key domain of an index: totally ordered, byte-encodable.
pub trait IndexKey:
    Ord + Clone + Codec + Send + Sync + std::fmt::Debug + 'static
{
}

impl<T> IndexKey for T where T: Ord + Clone + Codec + Send + Sync + std::fmt::Debug + 'static {}

/// Value domain of an index: equality-comparable, byte-encodable.
pub trait IndexValue:
    PartialEq + Clone + Codec + Send + Sync + std::fmt::Debug + 'static
{
}

impl<T> IndexValue for T where
    T: PartialEq + Clone + Codec + Send + Sync + std::fmt::Debug + 'static
{
}

/// One B-tree vertex, persisted as exactly one block.
///
/// `keys` and `values` are positionally aligned; `children` holds
/// `keys.len() + 1` block ids for internal nodes and nothing for leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<K, V> {
    pub id: BlockId,
    pub is_leaf: bool,
    pub keys: Vec<K>,
    pub values: Vec<V>,
    pub children: Vec<BlockId>,
}

impl<K, V> Node<K, V> {
    pub fn new(id: BlockId, is_leaf: bool) -> Self {
        Self {
            id,
            is_leaf,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Storage abstraction the B-tree routes every node read and mutation
/// through, keeping the tree itself storage-agnostic.
#[trait_variant::make(Send)]
pub trait NodeStore<K: IndexKey, V: IndexValue>: Clone + Send + Sync + 'static {
    /// Root of the tree. Creates an empty leaf root on first access so the
    /// root always exists once an index has been opened.
    async fn get_root(&self) -> Result<Node<K, V>, TreeError>;

    /// Points the persistent root pointer at `node`.
    async fn make_root(&self, node: &Node<K, V>) -> Result<(), TreeError>;

    /// Allocates backing storage for a fresh node.
    async fn create(&self, is_leaf: bool) -> Result<Node<K, V>, TreeError>;

    async fn get(&self, id: BlockId) -> Result<Node<K, V>, TreeError>;

    async fn save(&self, node: &Node<K, V>) -> Result<(), TreeError>;

    /// Destroys the node and returns its block to the free list.
    async fn delete(&self, node: Node<K, V>) -> Result<(), TreeError>;
}
