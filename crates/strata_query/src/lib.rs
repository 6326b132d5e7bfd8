//! Columnar iterator engine with predicate pushdown.
//!
//! `row` defines the hierarchical row-number algebra that every iterator
//! walks, `sync` contains the synchronous single-column scanner, and `join`
//! the compositional iterators (inner join, left join, union) built on top
//! of it. `block` declares the storage contracts a columnar backend must
//! satisfy and `mem` provides the in-memory implementation used by tests
//! and small blocks. `pool`, `intern`, and `predicate` round out the
//! supporting machinery.

mod block;
mod error;
mod intern;
mod iter;
mod join;
mod mem;
mod pool;
mod predicate;
mod row;
mod sync;
mod value;

pub use block::{ColumnChunk, Page, RowGroup, ValueReader};
pub use error::ScanError;
pub use intern::Interner;
pub use iter::{EntryKey, IteratorResult, OtherValue, RowIterator};
pub use join::{JoinIterator, LeftJoinIterator, UnionIterator};
pub use mem::{MemPage, MemRowGroup};
pub use pool::{get_value_buffer, put_value_buffer, ResultPool};
pub use predicate::{
    BoolPredicate, BytesPredicate, CallbackPredicate, CmpOp, FloatPredicate, GroupPredicate,
    IntPredicate, KeyValueGroupPredicate, NonNullPredicate, Predicate, RegexPredicate,
};
pub use row::{RowNumber, MAX_DEFINITION_LEVEL};
pub use sync::{SyncIterator, SyncOptions};
pub use value::{Value, ValueKind};
