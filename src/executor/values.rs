//! In-memory row source.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::error::Result;
use crate::executor::Executor;

/// Yields a fixed list of rows. Restartable, so it can serve as the inner
/// side of a nested-loop join.
pub struct ValuesExecutor {
    schema: RecordSchema,
    rows: Vec<TupleRecord>,
    cursor: usize,
}

impl ValuesExecutor {
    /// Fails with `SchemaMismatch` if any row does not fit `schema`.
    pub fn new(schema: RecordSchema, rows: Vec<TupleRecord>) -> Result<Self> {
        for row in &rows {
            schema.check(row)?;
        }
        Ok(Self {
            schema,
            rows,
            cursor: 0,
        })
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn close(&mut self) {
        self.cursor = self.rows.len();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, FieldType};
    use crate::error::DbError;
    use crate::executor::Operator;
    use anyhow::Result;

    #[test]
    fn test_values_yields_rows_in_order() -> Result<()> {
        let schema = RecordSchema::new(vec![(FieldType::Int, "a"), (FieldType::Text(4), "b")]);
        let rows = vec![
            TupleRecord::new(vec![Field::Int(1), Field::from("x")]),
            TupleRecord::new(vec![Field::Int(2), Field::from("y")]),
        ];
        let mut op = Operator::from(ValuesExecutor::new(schema, rows.clone())?);

        assert_eq!(op.drain()?, rows);
        assert_eq!(op.drain()?, rows);
        Ok(())
    }

    #[test]
    fn test_values_rejects_nonconforming_rows() {
        let schema = RecordSchema::from_types(&[FieldType::Int]);
        let rows = vec![TupleRecord::new(vec![Field::from("nope")])];
        assert!(matches!(
            ValuesExecutor::new(schema, rows),
            Err(DbError::SchemaMismatch(_))
        ));
    }
}
