//! Persistent indexing core for an embedded database.
//!
//! A disk-backed B-tree over a paged block store with a write-behind
//! pipeline, plus a query front end that picks between index lookups and
//! full table scans and streams the matching records.

pub mod block;
pub mod node;
pub mod prelude;
pub mod query;
pub mod tree;

pub use burrow_core as core;

pub use block::BlockStore;
pub use node::BlockNodeStore;
pub use query::{AnyIndex, QueryEngine, QueryError};
pub use tree::{BTree, TreeStats};
