//! Aggregate executor implementation.
//!
//! Blocking: the whole child is consumed while the node is opened. Output is
//! one tuple per group, `(group, value)`, in the order groups were first
//! seen; without grouping, a single `(value)` tuple.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, Result};
use crate::executor::{Executor, Operator};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Count => "COUNT",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AggregateOp {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateOp::Count),
            "sum" => Ok(AggregateOp::Sum),
            "avg" => Ok(AggregateOp::Avg),
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            other => Err(DbError::InvalidArgument(format!(
                "unknown aggregate '{}'",
                other
            ))),
        }
    }
}

/// Running state for one group.
#[derive(Debug, Default)]
struct Accumulator {
    count: i64,
    sum: i64,
    min: Option<Field>,
    max: Option<Field>,
}

impl Accumulator {
    fn add(&mut self, value: &Field) {
        self.count += 1;
        if let Field::Int(v) = value {
            self.sum += i64::from(*v);
        }
        if self.min.as_ref().map_or(true, |m| value < m) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |m| value > m) {
            self.max = Some(value.clone());
        }
    }

    /// `None` for AVG/MIN/MAX over no rows.
    fn finish(&self, op: AggregateOp) -> Result<Option<Field>> {
        let int = |v: i64| {
            i32::try_from(v)
                .map(Field::Int)
                .map_err(|_| DbError::InvalidArgument(format!("{} result {} overflows int", op, v)))
        };
        match op {
            AggregateOp::Count => int(self.count).map(Some),
            AggregateOp::Sum => int(self.sum).map(Some),
            AggregateOp::Avg if self.count == 0 => Ok(None),
            AggregateOp::Avg => int(self.sum / self.count).map(Some),
            AggregateOp::Min => Ok(self.min.clone()),
            AggregateOp::Max => Ok(self.max.clone()),
        }
    }
}

/// Folds its child into one tuple per group, in the order groups are first
/// seen, or a single tuple when ungrouped.
///
/// Values have no NULL, so a group with no value to report is left out
/// rather than padded. COUNT and SUM over empty ungrouped input yield `0`,
/// while AVG, MIN and MAX over empty ungrouped input yield no tuple at all.
pub struct AggregateExecutor {
    child: Box<Operator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    schema: RecordSchema,
    results: Vec<TupleRecord>,
    cursor: usize,
}

impl AggregateExecutor {
    /// SUM and AVG need an int field; COUNT, MIN and MAX take either type.
    pub fn new(
        child: Operator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let input = child.output_schema();
        let agg_type = input.field_type(agg_field).ok_or_else(|| {
            DbError::InvalidArgument(format!("aggregate field {} out of range", agg_field))
        })?;
        if matches!(op, AggregateOp::Sum | AggregateOp::Avg) && agg_type != FieldType::Int {
            return Err(DbError::SchemaMismatch(format!(
                "{} needs an int field, got {}",
                op, agg_type
            )));
        }

        let value_type = match op {
            AggregateOp::Min | AggregateOp::Max => agg_type,
            _ => FieldType::Int,
        };
        let value_name = format!("{}({})", op, input.field_name(agg_field).unwrap_or_default());

        let mut fields = Vec::with_capacity(2);
        if let Some(group) = group_field {
            let group_type = input.field_type(group).ok_or_else(|| {
                DbError::InvalidArgument(format!("group field {} out of range", group))
            })?;
            fields.push((group_type, input.field_name(group).unwrap_or_default().to_string()));
        }
        fields.push((value_type, value_name));

        Ok(Self {
            child: Box::new(child),
            agg_field,
            group_field,
            op,
            schema: RecordSchema::new(fields),
            results: Vec::new(),
            cursor: 0,
        })
    }

    fn field_of(tuple: &TupleRecord, index: usize) -> Result<&Field> {
        tuple
            .field(index)
            .ok_or_else(|| DbError::SchemaMismatch(format!("tuple {} has no field {}", tuple, index)))
    }

    fn compute(&mut self) -> Result<Vec<TupleRecord>> {
        let mut groups: Vec<(Option<Field>, Accumulator)> = Vec::new();
        let mut index: HashMap<Field, usize> = HashMap::new();

        self.child.open()?;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            let value = Self::field_of(&tuple, self.agg_field)?;
            let slot = match self.group_field {
                Some(group) => {
                    let key = Self::field_of(&tuple, group)?;
                    match index.get(key) {
                        Some(&slot) => slot,
                        None => {
                            index.insert(key.clone(), groups.len());
                            groups.push((Some(key.clone()), Accumulator::default()));
                            groups.len() - 1
                        }
                    }
                }
                None => {
                    if groups.is_empty() {
                        groups.push((None, Accumulator::default()));
                    }
                    0
                }
            };
            groups[slot].1.add(value);
        }
        self.child.close();

        if self.group_field.is_none() && groups.is_empty() {
            groups.push((None, Accumulator::default()));
        }

        let mut results = Vec::with_capacity(groups.len());
        for (key, acc) in groups {
            let Some(value) = acc.finish(self.op)? else {
                continue;
            };
            let fields = match key {
                Some(key) => vec![key, value],
                None => vec![value],
            };
            results.push(TupleRecord::new(fields));
        }
        Ok(results)
    }
}

impl Executor for AggregateExecutor {
    fn init(&mut self) -> Result<()> {
        self.results = self.compute()?;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        let tuple = self.results.get(self.cursor).cloned();
        if tuple.is_some() {
            self.cursor += 1;
        }
        Ok(tuple)
    }

    fn close(&mut self) {
        self.results.clear();
        self.cursor = 0;
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}
