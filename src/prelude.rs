pub use burrow_core::*;

use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("tree error: {0}")]
    TreeError(#[from] TreeError),

    #[error("query error: {0}")]
    QueryError(#[from] crate::query::QueryError),

    #[error("record error: {0}")]
    RecordError(#[from] RecordError),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
