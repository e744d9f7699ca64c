use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };

        write!(f, "{symbol}")
    }
}

/// Immutable query filter over a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Binary {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    Between {
        field: String,
        min: FieldValue,
        max: FieldValue,
    },
}

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("predicate value incompatible with field {field}")]
    TypeMismatch { field: String },
}

impl Predicate {
    pub fn binary(
        field: impl Into<String>,
        op: CompareOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        Predicate::Binary {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn between(
        field: impl Into<String>,
        min: impl Into<FieldValue>,
        max: impl Into<FieldValue>,
    ) -> Self {
        Predicate::Between {
            field: field.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Binary { field, .. } => field,
            Predicate::Between { field, .. } => field,
        }
    }

    /// Evaluates the filter against a materialized record.
    ///
    /// A record without the field does not match. A record whose field has a
    /// different type than the predicate value is a type mismatch error.
    pub fn matches(&self, record: &Record) -> Result<bool, PredicateError> {
        match self {
            Predicate::Binary { field, op, value } => {
                let Some(actual) = record.field(field) else {
                    return Ok(false);
                };

                let ord = actual.compare(value).ok_or_else(|| {
                    PredicateError::TypeMismatch {
                        field: field.clone(),
                    }
                })?;

                let hit = match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                };

                Ok(hit)
            }
            Predicate::Between { field, min, max } => {
                let Some(actual) = record.field(field) else {
                    return Ok(false);
                };

                let mismatch = || PredicateError::TypeMismatch {
                    field: field.clone(),
                };

                let above = actual.compare(min).ok_or_else(mismatch)? != Ordering::Less;
                let below = actual.compare(max).ok_or_else(mismatch)? != Ordering::Greater;

                Ok(above && below)
            }
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Binary { field, op, value } => write!(f, "{field} {op} {value}"),
            Predicate::Between { field, min, max } => {
                write!(f, "{field} BETWEEN {min} AND {max}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_display() {
        let eq = Predicate::binary("age", CompareOp::Eq, 30);
        assert_eq!(eq.to_string(), "age = 30");

        let name = Predicate::binary("name", CompareOp::Ge, "ada");
        assert_eq!(name.to_string(), "name >= 'ada'");

        let between = Predicate::between("age", 18, 30);
        assert_eq!(between.to_string(), "age BETWEEN 18 AND 30");
    }

    #[test]
    fn binary_evaluation() {
        let record = Record::new().with("age", 25);

        let cases = [
            (CompareOp::Eq, 25, true),
            (CompareOp::Eq, 30, false),
            (CompareOp::Lt, 30, true),
            (CompareOp::Le, 25, true),
            (CompareOp::Gt, 25, false),
            (CompareOp::Ge, 25, true),
        ];

        for (op, value, expected) in cases {
            let predicate = Predicate::binary("age", op, value);
            assert_eq!(predicate.matches(&record).unwrap(), expected, "{predicate}");
        }
    }

    #[test]
    fn between_is_inclusive() {
        let record = Record::new().with("age", 18);
        assert!(Predicate::between("age", 18, 30).matches(&record).unwrap());
        assert!(!Predicate::between("age", 19, 30).matches(&record).unwrap());
    }

    #[test]
    fn missing_field_does_not_match() {
        let record = Record::new().with("age", 18);
        let predicate = Predicate::binary("name", CompareOp::Eq, "ada");
        assert!(!predicate.matches(&record).unwrap());
    }

    #[test]
    fn type_conflict_is_an_error() {
        let record = Record::new().with("age", 18);
        let predicate = Predicate::binary("age", CompareOp::Eq, "ada");
        assert!(matches!(
            predicate.matches(&record),
            Err(PredicateError::TypeMismatch { .. })
        ));
    }
}
