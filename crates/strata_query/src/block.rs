//! Storage contracts between the iterator engine and a columnar backend.
//!
//! The engine never sees a concrete file layout. Any format that can hand
//! out row groups, column chunks, and pages of level-annotated values can
//! drive the iterators. Handles released by dropping them; iterators drop
//! chunks and pages as soon as they advance past them.

use crate::error::ScanError;
use crate::value::Value;

/// A horizontal slab of rows across all columns.
pub trait RowGroup: Send + Sync {
    fn num_rows(&self) -> u64;

    /// Open a fresh reader over one column of this row group.
    fn column_chunk(&self, column: usize) -> Box<dyn ColumnChunk>;
}

/// One column within one row group, exposed as a stream of pages.
pub trait ColumnChunk: Send {
    fn num_values(&self) -> u64;

    /// Next page in the chunk, or `None` when exhausted.
    fn next_page(&mut self) -> Result<Option<Box<dyn Page>>, ScanError>;
}

/// A sub-unit of a column chunk: the unit of i/o and of reslicing.
pub trait Page: Send {
    fn num_rows(&self) -> u64;

    /// Fresh reader over the page's values.
    fn values(&self) -> Box<dyn ValueReader>;

    /// Repetition level of every value in the page. A zero marks the first
    /// value of a new top-level row, which is what makes in-page row
    /// skipping possible.
    fn repetition_levels(&self) -> &[u8];

    /// Narrow the page to rows `[start_row, end_row)`.
    fn slice(&self, start_row: u64, end_row: u64) -> Box<dyn Page>;
}

/// Pull-based value stream over one page.
pub trait ValueReader: Send {
    /// Fill `out` from the front, returning how many values were written.
    /// Zero means the page is exhausted.
    fn read_values(&mut self, out: &mut [Value]) -> Result<usize, ScanError>;
}
