//! Row-set helpers for tests: generate integer rows, load them into a
//! table, and compare operator output against an expected set.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::access::value::{Field, FieldType};
use crate::database::Database;
use crate::executor::{Operator, SeqScanExecutor};
use crate::storage::page::TableId;
use anyhow::{bail, Result};
use rand::Rng;
use std::collections::HashMap;

/// `rows` rows of `columns` ints drawn from `0..max_value`. A column listed
/// in `column_spec` is fixed to the given value in every row.
pub fn random_rows(
    columns: usize,
    rows: usize,
    max_value: i32,
    column_spec: &HashMap<usize, i32>,
) -> Vec<Vec<i32>> {
    let mut rng = rand::thread_rng();
    (0..rows)
        .map(|_| {
            (0..columns)
                .map(|c| match column_spec.get(&c) {
                    Some(&fixed) => fixed,
                    None => rng.gen_range(0..max_value.max(1)),
                })
                .collect()
        })
        .collect()
}

/// Like [`random_rows`] but with a non-decreasing first column. Each row
/// repeats the previous row's first value with probability
/// `duplicate_probability`.
pub fn sorted_rows(
    columns: usize,
    rows: usize,
    max_value: i32,
    duplicate_probability: f64,
) -> Vec<Vec<i32>> {
    let mut rng = rand::thread_rng();
    let mut result = random_rows(columns, rows, max_value, &HashMap::new());
    if columns == 0 {
        return result;
    }

    let mut previous: Option<i32> = None;
    for row in &mut result {
        let key = match previous {
            Some(prev) if rng.gen_bool(duplicate_probability.clamp(0.0, 1.0)) => prev,
            Some(prev) if prev + 1 < max_value => rng.gen_range(prev + 1..max_value),
            Some(prev) => prev,
            None => rng.gen_range(0..max_value.max(1)),
        };
        row[0] = key;
        previous = Some(key);
    }
    result
}

pub fn int_schema(columns: usize) -> RecordSchema {
    RecordSchema::from_types(&vec![FieldType::Int; columns])
}

pub fn to_tuples(rows: &[Vec<i32>]) -> Vec<TupleRecord> {
    rows.iter()
        .map(|row| TupleRecord::new(row.iter().copied().map(Field::Int).collect()))
        .collect()
}

/// Creates an int table named `name` holding `rows`, committed in one
/// transaction.
pub fn load_rows(db: &Database, name: &str, columns: usize, rows: &[Vec<i32>]) -> Result<TableId> {
    let table_id = db.create_table(name, int_schema(columns))?;
    let heap = db.table_heap(table_id)?;
    let txn = db.transaction();
    for tuple in to_tuples(rows) {
        heap.insert_tuple(txn.id(), &tuple)?;
    }
    txn.commit()?;
    Ok(table_id)
}

/// Every live tuple of a table, read in its own transaction.
pub fn scan_table(db: &Database, table_id: TableId) -> Result<Vec<TupleRecord>> {
    let txn = db.transaction();
    let tuples = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?).drain()?;
    txn.commit()?;
    Ok(tuples)
}

fn counts(tuples: &[TupleRecord]) -> HashMap<&TupleRecord, isize> {
    let mut counts = HashMap::new();
    for tuple in tuples {
        *counts.entry(tuple).or_insert(0) += 1;
    }
    counts
}

/// Fails unless `actual` and `expected` hold the same tuples with the same
/// multiplicities, in any order.
pub fn match_tuples(actual: &[TupleRecord], expected: &[TupleRecord]) -> Result<()> {
    let mut balance = counts(expected);
    for (tuple, n) in counts(actual) {
        *balance.entry(tuple).or_insert(0) -= n;
    }

    let missing: Vec<String> = balance
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(t, n)| format!("{} x{}", t, n))
        .collect();
    let unexpected: Vec<String> = balance
        .iter()
        .filter(|(_, n)| **n < 0)
        .map(|(t, n)| format!("{} x{}", t, -n))
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        bail!(
            "tuple sets differ: missing [{}], unexpected [{}]",
            missing.join(", "),
            unexpected.join(", ")
        );
    }
    Ok(())
}

/// Fails unless `actual` equals `expected` tuple by tuple.
pub fn match_tuples_ordered(actual: &[TupleRecord], expected: &[TupleRecord]) -> Result<()> {
    if actual.len() != expected.len() {
        bail!("expected {} tuples, got {}", expected.len(), actual.len());
    }
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        if a != e {
            bail!("tuple {} differs: expected {}, got {}", i, e, a);
        }
    }
    Ok(())
}
