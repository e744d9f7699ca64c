use std::collections::HashMap;
use std::ops::Bound;
use std::pin::Pin;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use burrow_core::{CompareOp, FieldValue, Predicate, Record, RecordId, RecordStore, TreeError};

use crate::node::BlockNodeStore;
use crate::tree::BTree;

use super::QueryError;

/// One field index bound to the file-backed node store.
pub type RecordIndex<K> = BTree<K, RecordId, BlockNodeStore<K, RecordId>>;

/// Opaque handle to a stream of record ids coming out of an index lookup.
pub type IdStream = Pin<Box<dyn Stream<Item = Result<RecordId, TreeError>> + Send>>;

/// Stream of records produced by a query.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, QueryError>> + Send>>;

/// Tagged dispatch over the closed set of indexable key types.
pub enum AnyIndex {
    Int(RecordIndex<i64>),
    Text(RecordIndex<String>),
    Timestamp(RecordIndex<DateTime<Utc>>),
}

fn as_int(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Int(raw) => Some(*raw),
        _ => None,
    }
}

fn as_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Text(raw) => Some(raw.clone()),
        _ => None,
    }
}

fn as_timestamp(value: &FieldValue) -> Option<DateTime<Utc>> {
    match value {
        FieldValue::Timestamp(raw) => Some(*raw),
        _ => None,
    }
}

fn bound_key<K>(
    bound: Bound<&FieldValue>,
    extract: impl Fn(&FieldValue) -> Option<K>,
) -> Option<Bound<K>> {
    match bound {
        Bound::Unbounded => Some(Bound::Unbounded),
        Bound::Included(value) => extract(value).map(Bound::Included),
        Bound::Excluded(value) => extract(value).map(Bound::Excluded),
    }
}

impl AnyIndex {
    /// Whether the value's type matches the index key type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (AnyIndex::Int(_), FieldValue::Int(_))
                | (AnyIndex::Text(_), FieldValue::Text(_))
                | (AnyIndex::Timestamp(_), FieldValue::Timestamp(_))
        )
    }

    /// Point lookup; `None` when the value type does not match.
    pub fn find_equal(&self, value: &FieldValue) -> Option<IdStream> {
        match (self, value) {
            (AnyIndex::Int(index), FieldValue::Int(key)) => Some(index.find(*key).boxed()),
            (AnyIndex::Text(index), FieldValue::Text(key)) => {
                Some(index.find(key.clone()).boxed())
            }
            (AnyIndex::Timestamp(index), FieldValue::Timestamp(key)) => {
                Some(index.find(*key).boxed())
            }
            _ => None,
        }
    }

    /// Range lookup; `None` when either bound's type does not match.
    pub fn find_range(
        &self,
        lower: Bound<&FieldValue>,
        upper: Bound<&FieldValue>,
    ) -> Option<IdStream> {
        match self {
            AnyIndex::Int(index) => {
                let lower = bound_key(lower, as_int)?;
                let upper = bound_key(upper, as_int)?;
                Some(index.find_range(lower, upper).boxed())
            }
            AnyIndex::Text(index) => {
                let lower = bound_key(lower, as_text)?;
                let upper = bound_key(upper, as_text)?;
                Some(index.find_range(lower, upper).boxed())
            }
            AnyIndex::Timestamp(index) => {
                let lower = bound_key(lower, as_timestamp)?;
                let upper = bound_key(upper, as_timestamp)?;
                Some(index.find_range(lower, upper).boxed())
            }
        }
    }
}

enum Plan {
    Index(IdStream),
    Scan,
    Mismatch(String),
}

/// Executes predicates against record storage, preferring a registered
/// index over a full scan whenever one matches the predicate's field and
/// value type.
pub struct QueryEngine<R: RecordStore> {
    records: R,
    indexes: HashMap<String, AnyIndex>,
    cancel: CancellationToken,
}

impl<R: RecordStore> QueryEngine<R> {
    pub fn new(records: R, cancel: CancellationToken) -> Self {
        Self {
            records,
            indexes: HashMap::new(),
            cancel,
        }
    }

    /// Registers an index over `field`.
    pub fn add_index(&mut self, field: impl Into<String>, index: AnyIndex) {
        self.indexes.insert(field.into(), index);
    }

    pub fn index(&self, field: &str) -> Option<&AnyIndex> {
        self.indexes.get(field)
    }

    /// Plans and executes the predicate, returning a lazy record stream.
    pub fn execute(&self, predicate: Predicate) -> RecordStream {
        match self.plan(&predicate) {
            Plan::Index(ids) => self.resolve(ids),
            Plan::Scan => self.scan(predicate),
            Plan::Mismatch(field) => {
                let failure: Result<Record, QueryError> =
                    Err(QueryError::TypeMismatch { field });
                futures_util::stream::once(async move { failure }).boxed()
            }
        }
    }

    fn plan(&self, predicate: &Predicate) -> Plan {
        match predicate {
            Predicate::Binary { field, op, value } => {
                let Some(index) = self.indexes.get(field) else {
                    debug!(%predicate, "no index over field, using full scan");
                    return Plan::Scan;
                };

                let ids = match op {
                    CompareOp::Eq => index.find_equal(value),
                    CompareOp::Lt => index.find_range(Bound::Unbounded, Bound::Excluded(value)),
                    CompareOp::Le => index.find_range(Bound::Unbounded, Bound::Included(value)),
                    CompareOp::Gt => index.find_range(Bound::Excluded(value), Bound::Unbounded),
                    CompareOp::Ge => index.find_range(Bound::Included(value), Bound::Unbounded),
                };

                match ids {
                    Some(ids) => {
                        debug!(%predicate, "using index lookup");
                        Plan::Index(ids)
                    }
                    None => Plan::Mismatch(field.clone()),
                }
            }
            Predicate::Between { field, min, max } => {
                let Some(index) = self.indexes.get(field) else {
                    debug!(%predicate, "no index over field, using full scan");
                    return Plan::Scan;
                };

                match index.find_range(Bound::Included(min), Bound::Included(max)) {
                    Some(ids) => {
                        debug!(%predicate, "using index range");
                        Plan::Index(ids)
                    }
                    None => Plan::Mismatch(field.clone()),
                }
            }
        }
    }

    /// Resolves a stream of record ids through record storage. A missing
    /// record for an id the index produced is an index inconsistency.
    fn resolve(&self, ids: IdStream) -> RecordStream {
        let records = self.records.clone();
        let cancel = self.cancel.clone();

        stream! {
            let mut ids = ids;

            while let Some(next) = ids.next().await {
                if cancel.is_cancelled() {
                    yield Err(QueryError::Cancelled);
                    return;
                }

                let id = match next {
                    Ok(id) => id,
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                };

                match records.get(id).await {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => {
                        yield Err(QueryError::IndexInconsistency(id));
                        return;
                    }
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                }
            }
        }
        .boxed()
    }

    /// Full scan evaluating the predicate per record.
    fn scan(&self, predicate: Predicate) -> RecordStream {
        let records = self.records.clone();
        let cancel = self.cancel.clone();

        stream! {
            let mut scan = match records.scan() {
                Ok(scan) => scan,
                Err(error) => {
                    yield Err(error.into());
                    return;
                }
            };

            while let Some(next) = scan.next().await {
                if cancel.is_cancelled() {
                    yield Err(QueryError::Cancelled);
                    return;
                }

                let record = match next {
                    Ok(record) => record,
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                };

                match predicate.matches(&record) {
                    Ok(true) => yield Ok(record),
                    Ok(false) => continue,
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                }
            }
        }
        .boxed()
    }
}
