//! Comparison predicates for filters and joins.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::access::value::Field;
use crate::error::{DbError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    /// Substring containment on text, equality on integers.
    Like,
}

impl CompareOp {
    /// Applies `left op right`. Values of different types are only ever
    /// not-equal.
    pub fn apply(&self, left: &Field, right: &Field) -> bool {
        let ordering = match (left, right) {
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Text(a), Field::Text(b)) => {
                if *self == CompareOp::Like {
                    return a.contains(b.as_str());
                }
                a.cmp(b)
            }
            _ => return *self == CompareOp::NotEquals,
        };

        match self {
            CompareOp::Equals | CompareOp::Like => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ordering != Ordering::Less,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEq => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::Like => "LIKE",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for CompareOp {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(CompareOp::Equals),
            "<>" | "!=" => Ok(CompareOp::NotEquals),
            ">" => Ok(CompareOp::GreaterThan),
            ">=" => Ok(CompareOp::GreaterThanOrEq),
            "<" => Ok(CompareOp::LessThan),
            "<=" => Ok(CompareOp::LessThanOrEq),
            "like" => Ok(CompareOp::Like),
            other => Err(DbError::InvalidArgument(format!(
                "unknown comparison '{}'",
                other
            ))),
        }
    }
}

fn check_index(schema: &RecordSchema, index: usize) -> Result<()> {
    if index < schema.len() {
        Ok(())
    } else {
        Err(DbError::InvalidArgument(format!(
            "field {} out of range for schema ({})",
            index, schema
        )))
    }
}

/// `tuple[field] op operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: usize,
    pub op: CompareOp,
    pub operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: impl Into<Field>) -> Self {
        Self {
            field,
            op,
            operand: operand.into(),
        }
    }

    pub fn validate(&self, schema: &RecordSchema) -> Result<()> {
        check_index(schema, self.field)
    }

    pub fn matches(&self, tuple: &TupleRecord) -> bool {
        tuple
            .field(self.field)
            .is_some_and(|value| self.op.apply(value, &self.operand))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} {} {}", self.field, self.op, self.operand)
    }
}

/// `left[left_field] op right[right_field]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left_field: usize,
    pub op: CompareOp,
    pub right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn equals(left_field: usize, right_field: usize) -> Self {
        Self::new(left_field, CompareOp::Equals, right_field)
    }

    pub fn validate(&self, left: &RecordSchema, right: &RecordSchema) -> Result<()> {
        check_index(left, self.left_field)?;
        check_index(right, self.right_field)
    }

    pub fn matches(&self, left: &TupleRecord, right: &TupleRecord) -> bool {
        match (left.field(self.left_field), right.field(self.right_field)) {
            (Some(a), Some(b)) => self.op.apply(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::FieldType;

    #[test]
    fn test_int_comparisons() {
        let (one, two) = (Field::Int(1), Field::Int(2));
        assert!(CompareOp::LessThan.apply(&one, &two));
        assert!(CompareOp::LessThanOrEq.apply(&one, &one));
        assert!(!CompareOp::GreaterThan.apply(&one, &two));
        assert!(CompareOp::GreaterThanOrEq.apply(&two, &one));
        assert!(CompareOp::NotEquals.apply(&one, &two));
        assert!(CompareOp::Like.apply(&two, &two));
        assert!(!CompareOp::Like.apply(&one, &two));
    }

    #[test]
    fn test_text_like_is_substring() {
        let hay = Field::from("database");
        assert!(CompareOp::Like.apply(&hay, &Field::from("tab")));
        assert!(!CompareOp::Like.apply(&hay, &Field::from("xyz")));
        assert!(CompareOp::LessThan.apply(&Field::from("abc"), &Field::from("abd")));
    }

    #[test]
    fn test_mixed_types_only_not_equal() {
        let (int, text) = (Field::Int(1), Field::from("1"));
        assert!(!CompareOp::Equals.apply(&int, &text));
        assert!(!CompareOp::LessThan.apply(&int, &text));
        assert!(CompareOp::NotEquals.apply(&int, &text));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("LIKE".parse::<CompareOp>().unwrap(), CompareOp::Like);
        assert_eq!(">=".parse::<CompareOp>().unwrap(), CompareOp::GreaterThanOrEq);
        assert!("~".parse::<CompareOp>().is_err());

        let p = Predicate::new(1, CompareOp::GreaterThan, 10);
        assert_eq!(p.to_string(), "$1 > 10");
    }

    #[test]
    fn test_predicate_matches() {
        let tuple = TupleRecord::new(vec![Field::Int(5), Field::from("bob")]);
        assert!(Predicate::new(0, CompareOp::Equals, 5).matches(&tuple));
        assert!(Predicate::new(1, CompareOp::Like, "o").matches(&tuple));
        assert!(!Predicate::new(7, CompareOp::Equals, 5).matches(&tuple));

        let schema = RecordSchema::from_types(&[FieldType::Int]);
        assert!(Predicate::new(0, CompareOp::Equals, 1).validate(&schema).is_ok());
        assert!(Predicate::new(1, CompareOp::Equals, 1).validate(&schema).is_err());
    }

    #[test]
    fn test_join_predicate() {
        let left = TupleRecord::new(vec![Field::Int(1), Field::from("a")]);
        let right = TupleRecord::new(vec![Field::Int(1), Field::from("x")]);
        assert!(JoinPredicate::equals(0, 0).matches(&left, &right));
        assert!(!JoinPredicate::equals(1, 1).matches(&left, &right));
        assert!(!JoinPredicate::new(0, CompareOp::LessThan, 1).matches(&left, &right));
    }
}
