//! Fixed-size block storage over a single file.
//!
//! Block 0 holds the store header; blocks 1..N hold tree nodes and
//! free-list chain entries. Writes go through a bounded queue drained by a
//! single background task in submission order, while reads go straight to
//! the file. A read issued after a write submission is therefore not
//! guaranteed to observe that write until the drainer has processed it;
//! the node manager cache is the layer that hides this asymmetry.

mod header;
mod pipeline;
mod store;

pub use store::BlockStore;
