use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::error::{DbError, Result};
use crate::executor::{Executor, Operator};

/// Keeps a subset of the child's fields, in the given order. The origin of
/// each tuple is carried over so a projection can still feed a delete.
pub struct ProjectionExecutor {
    child: Box<Operator>,
    fields: Vec<usize>,
    schema: RecordSchema,
}

impl ProjectionExecutor {
    pub fn new(child: Operator, fields: Vec<usize>) -> Result<Self> {
        let schema = child.output_schema().project(&fields)?;
        Ok(Self {
            child: Box::new(child),
            fields,
            schema,
        })
    }
}

impl Executor for ProjectionExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        if !self.child.has_next()? {
            return Ok(None);
        }
        let tuple = self.child.next()?;
        let values = self
            .fields
            .iter()
            .map(|&i| {
                tuple.field(i).cloned().ok_or_else(|| {
                    DbError::SchemaMismatch(format!("tuple {} has no field {}", tuple, i))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let projected = TupleRecord::new(values);
        Ok(Some(match tuple.record_id() {
            Some(record_id) => projected.with_record_id(record_id),
            None => projected,
        }))
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, FieldType};
    use crate::executor::values::ValuesExecutor;
    use anyhow::Result;

    fn source() -> Operator {
        let schema = RecordSchema::new(vec![
            (FieldType::Int, "a"),
            (FieldType::Text(4), "b"),
            (FieldType::Int, "c"),
        ]);
        let rows = vec![TupleRecord::new(vec![
            Field::Int(1),
            Field::from("x"),
            Field::Int(3),
        ])];
        Operator::from(ValuesExecutor::new(schema, rows).unwrap())
    }

    #[test]
    fn test_projection_reorders() -> Result<()> {
        let mut project = Operator::from(ProjectionExecutor::new(source(), vec![2, 0])?);
        assert_eq!(project.output_schema().field_name(0), Some("c"));
        assert_eq!(project.output_schema().field_name(1), Some("a"));
        assert_eq!(project.drain()?[0].fields(), &[Field::Int(3), Field::Int(1)]);
        Ok(())
    }

    #[test]
    fn test_projection_out_of_range() {
        assert!(ProjectionExecutor::new(source(), vec![0, 3]).is_err());
    }
}
