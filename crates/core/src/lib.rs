//! Traits and value types that are common to all burrow crates.
//!
//! Glossary:
//!  - `block`: fixed-size contiguous region of the backing file, addressed
//!    by its ordinal.
//!  - `node`: one B-tree vertex, persisted as exactly one block.
//!  - `record id`: opaque handle into the record storage collaborator.
//!  - `index`: a persistent mapping from a field's keys to record ids.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod codec;
pub mod config;
pub mod node;
pub mod predicate;
pub mod record;
pub mod testing;

pub use codec::*;
pub use config::*;
pub use node::*;
pub use predicate::*;
pub use record::*;

/// Ordinal of a fixed-size block within the backing file.
pub type BlockId = u32;

/// Monotonic sequence assigned to each submitted block write. The drain
/// watermark reports the last sequence the writer task has processed.
pub type WriteSeq = u64;

/// Compact handle into the record storage collaborator.
///
/// Wraps a non-negative integer; the negative [`RecordId::EMPTY`] sentinel
/// denotes absence so the present-vs-absent distinction survives encoding
/// without an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    pub const EMPTY: RecordId = RecordId(-1);

    pub fn new(raw: i64) -> Self {
        debug_assert!(raw >= 0, "record ids are non-negative");
        RecordId(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 < 0
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::new(value)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "#empty")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store already disposed")]
    Disposed,

    #[error("short read on block {0}")]
    ShortRead(BlockId),

    #[error("short write on block {0}")]
    ShortWrite(BlockId),

    #[error("payload of {got} bytes does not match block size {want}")]
    BadBlockSize { got: usize, want: usize },

    #[error("invalid store header: {0}")]
    InvalidHeader(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree degree must be at least 2, got {0}")]
    BadDegree(usize),

    #[error("index is empty")]
    EmptyIndex,

    #[error("encoded node needs {needed} bytes, block size is {limit}")]
    NodeOverflow { needed: usize, limit: usize },

    #[error("node {0} not found")]
    NodeNotFound(BlockId),

    #[error("node cache lock poisoned")]
    LockPoisoned,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TreeError {
    /// Whether the error was triggered by the ambient cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TreeError::Store(StoreError::Cancelled))
    }
}
