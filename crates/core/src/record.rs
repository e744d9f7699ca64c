use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RecordId;

/// Closed set of field types the engine can index and compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "integer",
            FieldValue::Text(_) => "text",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    /// Natural ordering within one type; `None` across types.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Text(value) => write!(f, "'{value}'"),
            FieldValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

/// A materialized record: named fields with typed values. The storage layer
/// treats records as opaque; only the query engine looks inside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self
            .fields
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .join(", ");

        write!(f, "{{{body}}}")
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("record store internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RecordError {
    pub fn internal<T>(value: T) -> Self
    where
        T: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RecordError::Internal(value.into())
    }
}

/// Record storage collaborator: maps record ids to opaque records.
#[trait_variant::make(Send)]
pub trait RecordStore: Clone + Send + Sync + 'static {
    type Scan: futures_core::Stream<Item = Result<Record, RecordError>> + Unpin + Send;

    async fn insert(&self, record: Record) -> Result<RecordId, RecordError>;

    async fn get(&self, id: RecordId) -> Result<Option<Record>, RecordError>;

    async fn update(&self, id: RecordId, record: Record) -> Result<(), RecordError>;

    async fn delete(&self, id: RecordId) -> Result<(), RecordError>;

    fn scan(&self) -> Result<Self::Scan, RecordError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_ordering_is_per_type() {
        let a = FieldValue::Int(1);
        let b = FieldValue::Int(2);
        assert_eq!(a.compare(&b), Some(Ordering::Less));

        let t = FieldValue::Text("x".into());
        assert_eq!(a.compare(&t), None);
    }

    #[test]
    fn record_display_is_canonical() {
        let record = Record::new().with("age", 30).with("name", "ada");
        assert_eq!(record.to_string(), "{age: 30, name: 'ada'}");
    }
}
