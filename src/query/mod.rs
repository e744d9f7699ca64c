//! Query front end: plans a predicate into an index lookup or a full table
//! scan and streams the matching records.

mod engine;

pub use engine::{AnyIndex, IdStream, QueryEngine, RecordIndex, RecordStream};

use thiserror::Error;

use burrow_core::{PredicateError, RecordError, RecordId, TreeError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("predicate value incompatible with field {field}")]
    TypeMismatch { field: String },

    #[error("index references missing record {0}")]
    IndexInconsistency(RecordId),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl From<PredicateError> for QueryError {
    fn from(error: PredicateError) -> Self {
        match error {
            PredicateError::TypeMismatch { field } => QueryError::TypeMismatch { field },
        }
    }
}
