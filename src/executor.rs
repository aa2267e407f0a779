//! Executor layer for query execution.
//!
//! Pull-based iterator model: a parent asks its child for one tuple at a time
//! through [`Operator`], which owns one node from a closed set of variants and
//! enforces the shared lifecycle `Unopened -> Open -> Closed`. Blocking nodes
//! (aggregate, sort) drain their child while being opened; all others stream.

use crate::access::heap::TableHeap;
use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::catalog::Catalog;
use crate::error::{DbError, Result};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::TableId;
use crate::transaction::TransactionId;
use std::sync::Arc;

pub mod aggregate;
pub mod delete;
pub mod filter;
pub mod insert;
pub mod nested_loop_join;
pub mod predicate;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod values;

pub use aggregate::{AggregateExecutor, AggregateOp};
pub use delete::DeleteExecutor;
pub use filter::FilterExecutor;
pub use insert::InsertExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use predicate::{CompareOp, JoinPredicate, Predicate};
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::{SortExecutor, SortOrder};
pub use values::ValuesExecutor;

/// Capability implemented by every operator node.
///
/// Nodes are driven through [`Operator`], never directly.
pub trait Executor: Send {
    /// Prepares the node, or rewinds it to its first tuple if it already ran.
    fn init(&mut self) -> Result<()>;

    /// The next tuple, or `None` once the node is exhausted.
    fn next(&mut self) -> Result<Option<TupleRecord>>;

    /// Releases per-run state and closes children. Safe in any state.
    fn close(&mut self);

    fn output_schema(&self) -> &RecordSchema;
}

/// Resources an operator tree runs against: the shared pool and catalog,
/// plus the transaction every page access is made under.
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<Catalog>,
    pub buffer_pool: BufferPoolManager,
    pub tid: TransactionId,
}

impl ExecutionContext {
    pub fn new(catalog: Arc<Catalog>, buffer_pool: BufferPoolManager, tid: TransactionId) -> Self {
        Self {
            catalog,
            buffer_pool,
            tid,
        }
    }

    pub fn table_heap(&self, table_id: TableId) -> Result<TableHeap> {
        Ok(TableHeap::new(
            self.buffer_pool.clone(),
            self.catalog.table(table_id)?,
        ))
    }
}

/// The closed set of operator kinds.
pub enum OperatorNode {
    Values(ValuesExecutor),
    SeqScan(SeqScanExecutor),
    Filter(FilterExecutor),
    Project(ProjectionExecutor),
    NestedLoopJoin(NestedLoopJoinExecutor),
    Aggregate(AggregateExecutor),
    Sort(SortExecutor),
    Insert(InsertExecutor),
    Delete(DeleteExecutor),
}

impl OperatorNode {
    fn executor(&self) -> &dyn Executor {
        match self {
            OperatorNode::Values(node) => node,
            OperatorNode::SeqScan(node) => node,
            OperatorNode::Filter(node) => node,
            OperatorNode::Project(node) => node,
            OperatorNode::NestedLoopJoin(node) => node,
            OperatorNode::Aggregate(node) => node,
            OperatorNode::Sort(node) => node,
            OperatorNode::Insert(node) => node,
            OperatorNode::Delete(node) => node,
        }
    }

    fn executor_mut(&mut self) -> &mut dyn Executor {
        match self {
            OperatorNode::Values(node) => node,
            OperatorNode::SeqScan(node) => node,
            OperatorNode::Filter(node) => node,
            OperatorNode::Project(node) => node,
            OperatorNode::NestedLoopJoin(node) => node,
            OperatorNode::Aggregate(node) => node,
            OperatorNode::Sort(node) => node,
            OperatorNode::Insert(node) => node,
            OperatorNode::Delete(node) => node,
        }
    }
}

macro_rules! impl_from_executor {
    ($($variant:ident => $executor:ty),* $(,)?) => {
        $(
            impl From<$executor> for Operator {
                fn from(node: $executor) -> Self {
                    Operator::new(OperatorNode::$variant(node))
                }
            }
        )*
    };
}

impl_from_executor! {
    Values => ValuesExecutor,
    SeqScan => SeqScanExecutor,
    Filter => FilterExecutor,
    Project => ProjectionExecutor,
    NestedLoopJoin => NestedLoopJoinExecutor,
    Aggregate => AggregateExecutor,
    Sort => SortExecutor,
    Insert => InsertExecutor,
    Delete => DeleteExecutor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Open,
    Closed,
}

/// One node of an operator tree, with its lifecycle and one tuple of
/// lookahead for `has_next`.
///
/// Any error raised while opening or advancing closes the node (and with it
/// every node below) before it is returned.
pub struct Operator {
    node: OperatorNode,
    phase: Phase,
    lookahead: Option<TupleRecord>,
}

impl Operator {
    pub fn new(node: OperatorNode) -> Self {
        Self {
            node,
            phase: Phase::Unopened,
            lookahead: None,
        }
    }

    /// Opens the node. Opening an open or closed node rewinds it.
    pub fn open(&mut self) -> Result<()> {
        self.lookahead = None;
        match self.node.executor_mut().init() {
            Ok(()) => {
                self.phase = Phase::Open;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if self.phase != Phase::Open {
            return Err(DbError::OperatorNotOpen);
        }
        if self.lookahead.is_none() {
            match self.node.executor_mut().next() {
                Ok(tuple) => self.lookahead = tuple,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        Ok(self.lookahead.is_some())
    }

    /// Fails with `NoSuchElement` once `has_next` would be false.
    pub fn next(&mut self) -> Result<TupleRecord> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        self.lookahead.take().ok_or(DbError::NoSuchElement)
    }

    pub fn close(&mut self) {
        if self.phase == Phase::Open {
            self.node.executor_mut().close();
        }
        self.phase = Phase::Closed;
        self.lookahead = None;
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn output_schema(&self) -> &RecordSchema {
        self.node.executor().output_schema()
    }

    /// Opens the node, pulls every tuple, and closes it again.
    pub fn drain(&mut self) -> Result<Vec<TupleRecord>> {
        self.open()?;
        let mut tuples = Vec::new();
        while self.has_next()? {
            tuples.push(self.next()?);
        }
        self.close();
        Ok(tuples)
    }
}

impl Drop for Operator {
    fn drop(&mut self) {
        self.close();
    }
}
