//! Nested-loop join.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::error::Result;
use crate::executor::predicate::JoinPredicate;
use crate::executor::{Executor, Operator};

/// For every outer tuple, rewinds the inner child and emits the
/// concatenation `outer ++ inner` of each pair satisfying the predicate.
pub struct NestedLoopJoinExecutor {
    outer: Box<Operator>,
    inner: Box<Operator>,
    predicate: JoinPredicate,
    schema: RecordSchema,
    current_outer: Option<TupleRecord>,
}

impl NestedLoopJoinExecutor {
    pub fn new(outer: Operator, inner: Operator, predicate: JoinPredicate) -> Result<Self> {
        predicate.validate(outer.output_schema(), inner.output_schema())?;
        let schema = RecordSchema::merge(outer.output_schema(), inner.output_schema());
        Ok(Self {
            outer: Box::new(outer),
            inner: Box::new(inner),
            predicate,
            schema,
            current_outer: None,
        })
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.current_outer = None;
        self.outer.open()
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        loop {
            if self.current_outer.is_none() {
                if !self.outer.has_next()? {
                    return Ok(None);
                }
                self.current_outer = Some(self.outer.next()?);
                self.inner.open()?;
            }

            if let Some(outer) = &self.current_outer {
                while self.inner.has_next()? {
                    let inner = self.inner.next()?;
                    if self.predicate.matches(outer, &inner) {
                        return Ok(Some(outer.concat(&inner)));
                    }
                }
            }
            self.current_outer = None;
        }
    }

    fn close(&mut self) {
        self.current_outer = None;
        self.inner.close();
        self.outer.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}
