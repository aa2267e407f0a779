//! Sort executor implementation.
//!
//! Materializes the child while being opened, then yields the tuples ordered
//! by one field. Ties keep their arrival order in both directions.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::error::{DbError, Result};
use crate::executor::{Executor, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

pub struct SortExecutor {
    child: Box<Operator>,
    field: usize,
    order: SortOrder,
    sorted: Vec<TupleRecord>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Operator, field: usize, order: SortOrder) -> Result<Self> {
        if field >= child.output_schema().len() {
            return Err(DbError::InvalidArgument(format!(
                "sort field {} out of range",
                field
            )));
        }
        Ok(Self {
            child: Box::new(child),
            field,
            order,
            sorted: Vec::new(),
            cursor: 0,
        })
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> Result<()> {
        let mut tuples = Vec::new();
        self.child.open()?;
        while self.child.has_next()? {
            tuples.push(self.child.next()?);
        }
        self.child.close();

        let field = self.field;
        match self.order {
            SortOrder::Asc => tuples.sort_by(|a, b| a.field(field).cmp(&b.field(field))),
            SortOrder::Desc => tuples.sort_by(|a, b| b.field(field).cmp(&a.field(field))),
        }
        self.sorted = tuples;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        let tuple = self.sorted.get(self.cursor).cloned();
        if tuple.is_some() {
            self.cursor += 1;
        }
        Ok(tuple)
    }

    fn close(&mut self) {
        self.sorted.clear();
        self.cursor = 0;
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        self.child.output_schema()
    }
}
