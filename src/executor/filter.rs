//! Filter executor implementation.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::error::Result;
use crate::executor::predicate::Predicate;
use crate::executor::{Executor, Operator};

/// Passes through the child's tuples that satisfy a predicate.
pub struct FilterExecutor {
    child: Box<Operator>,
    predicate: Predicate,
}

impl FilterExecutor {
    pub fn new(child: Operator, predicate: Predicate) -> Result<Self> {
        predicate.validate(child.output_schema())?;
        Ok(Self {
            child: Box::new(child),
            predicate,
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Executor for FilterExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.matches(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        self.child.output_schema()
    }
}
