//! In-memory columnar block.
//!
//! Columns are plain vectors of level-annotated values split into pages on
//! row boundaries. This is the backend used by tests and by small blocks
//! that never leave memory; it sits beside the storage traits the same way
//! an on-disk implementation would.

use std::ops::Range;
use std::sync::Arc;

use crate::block::{ColumnChunk, Page, RowGroup, ValueReader};
use crate::error::ScanError;
use crate::value::Value;

/// Shared payload of one page: values plus the index of each row's first value.
#[derive(Debug)]
struct PageData {
    values: Vec<Value>,
    repetition_levels: Vec<u8>,
    row_starts: Vec<usize>,
}

/// One page of an in-memory column, possibly narrowed to a row subrange.
#[derive(Clone, Debug)]
pub struct MemPage {
    data: Arc<PageData>,
    rows: Range<usize>,
    values: Range<usize>,
}

impl MemPage {
    fn new(data: Arc<PageData>, rows: Range<usize>) -> Self {
        let start = data.row_starts[rows.start];
        let end = if rows.end < data.row_starts.len() {
            data.row_starts[rows.end]
        } else {
            data.values.len()
        };
        MemPage {
            data,
            rows,
            values: start..end,
        }
    }
}

impl Page for MemPage {
    fn num_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    fn values(&self) -> Box<dyn ValueReader> {
        Box::new(MemValueReader {
            data: Arc::clone(&self.data),
            pos: self.values.start,
            end: self.values.end,
        })
    }

    fn repetition_levels(&self) -> &[u8] {
        &self.data.repetition_levels[self.values.clone()]
    }

    fn slice(&self, start_row: u64, end_row: u64) -> Box<dyn Page> {
        let start = self.rows.start + start_row as usize;
        let end = (self.rows.start + end_row as usize).min(self.rows.end);
        Box::new(MemPage::new(Arc::clone(&self.data), start..end))
    }
}

struct MemValueReader {
    data: Arc<PageData>,
    pos: usize,
    end: usize,
}

impl ValueReader for MemValueReader {
    fn read_values(&mut self, out: &mut [Value]) -> Result<usize, ScanError> {
        let n = out.len().min(self.end - self.pos);
        for (slot, value) in out[..n].iter_mut().zip(&self.data.values[self.pos..self.pos + n]) {
            *slot = value.clone();
        }
        self.pos += n;
        Ok(n)
    }
}

struct MemColumn {
    pages: Vec<Arc<PageData>>,
    num_values: u64,
}

struct MemColumnChunk {
    pages: Vec<MemPage>,
    next: usize,
    num_values: u64,
}

impl ColumnChunk for MemColumnChunk {
    fn num_values(&self) -> u64 {
        self.num_values
    }

    fn next_page(&mut self) -> Result<Option<Box<dyn Page>>, ScanError> {
        match self.pages.get(self.next) {
            Some(page) => {
                self.next += 1;
                Ok(Some(Box::new(page.clone())))
            }
            None => Ok(None),
        }
    }
}

/// A row group over in-memory columns.
pub struct MemRowGroup {
    num_rows: u64,
    columns: Vec<MemColumn>,
}

impl MemRowGroup {
    /// Build a row group from one value vector per column.
    ///
    /// Every column must cover the same `num_rows` top-level rows; a value
    /// with repetition level zero starts a new row. Columns are cut into
    /// pages of `rows_per_page` rows so scans exercise page transitions.
    pub fn new(columns: Vec<Vec<Value>>, num_rows: u64, rows_per_page: usize) -> Arc<Self> {
        assert!(rows_per_page > 0, "rows_per_page must be positive");
        let columns = columns
            .into_iter()
            .map(|values| build_column(values, rows_per_page))
            .collect();
        Arc::new(MemRowGroup { num_rows, columns })
    }
}

fn build_column(values: Vec<Value>, rows_per_page: usize) -> MemColumn {
    let num_values = values.len() as u64;
    let mut row_starts = Vec::new();
    for (i, v) in values.iter().enumerate() {
        if v.repetition_level == 0 {
            row_starts.push(i);
        }
    }

    let mut pages = Vec::new();
    let mut row = 0;
    while row < row_starts.len() {
        let end_row = (row + rows_per_page).min(row_starts.len());
        let start = row_starts[row];
        let end = if end_row < row_starts.len() {
            row_starts[end_row]
        } else {
            values.len()
        };
        let page_values: Vec<Value> = values[start..end].to_vec();
        let repetition_levels = page_values.iter().map(|v| v.repetition_level).collect();
        let page_row_starts = row_starts[row..end_row].iter().map(|s| s - start).collect();
        pages.push(Arc::new(PageData {
            values: page_values,
            repetition_levels,
            row_starts: page_row_starts,
        }));
        row = end_row;
    }

    MemColumn { pages, num_values }
}

impl RowGroup for MemRowGroup {
    fn num_rows(&self) -> u64 {
        self.num_rows
    }

    fn column_chunk(&self, column: usize) -> Box<dyn ColumnChunk> {
        let col = &self.columns[column];
        Box::new(MemColumnChunk {
            pages: col
                .pages
                .iter()
                .map(|data| MemPage::new(Arc::clone(data), 0..data.row_starts.len()))
                .collect(),
            next: 0,
            num_values: col.num_values,
        })
    }
}
