//! The iterator contract every scan node implements.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::ScanError;
use crate::row::RowNumber;
use crate::value::Value;

/// Entry keys are shared strings: iterators mint them once at construction
/// and clone the handle per result.
pub type EntryKey = Arc<str>;

/// Opaque payload slot for iterator-synthesized data (e.g. aggregates a
/// group predicate attaches for a downstream collector).
pub type OtherValue = Box<dyn Any + Send>;

/// A row of data: a row number plus named column values collected by the
/// iterators upstream. Internally an unstructured list for cheap append;
/// order is preserved and duplicate keys are allowed.
#[derive(Default)]
pub struct IteratorResult {
    pub row_number: RowNumber,
    pub entries: Vec<(EntryKey, Value)>,
    pub other_entries: Vec<(EntryKey, OtherValue)>,
}

impl IteratorResult {
    pub fn reset(&mut self) {
        self.entries.clear();
        self.other_entries.clear();
    }

    /// Move every entry of `other` into `self`, leaving `other` empty.
    pub fn append(&mut self, other: &mut IteratorResult) {
        if !other.entries.is_empty() {
            self.entries.append(&mut other.entries);
        }
        if !other.other_entries.is_empty() {
            self.other_entries.append(&mut other.other_entries);
        }
    }

    pub fn append_value(&mut self, key: EntryKey, value: Value) {
        self.entries.push((key, value));
    }

    pub fn append_other(&mut self, key: EntryKey, value: OtherValue) {
        self.other_entries.push((key, value));
    }

    /// Remove and return every opaque entry stored under `key`, in order.
    pub fn take_other(&mut self, key: &str) -> Vec<OtherValue> {
        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.other_entries.len() {
            if &*self.other_entries[i].0 == key {
                taken.push(self.other_entries.remove(i).1);
            } else {
                i += 1;
            }
        }
        taken
    }

    /// Values grouped by the given names, in name order. More efficient than
    /// building a map when the caller knows which columns it wants.
    pub fn columns<'a>(&'a self, names: &[&str]) -> Vec<Vec<&'a Value>> {
        let mut out: Vec<Vec<&Value>> = names.iter().map(|_| Vec::new()).collect();
        for (key, value) in &self.entries {
            for (i, name) in names.iter().enumerate() {
                if &**key == *name {
                    out[i].push(value);
                    break;
                }
            }
        }
        out
    }
}

impl fmt::Debug for IteratorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorResult")
            .field("row_number", &self.row_number)
            .field("entries", &self.entries)
            .field("other_entries", &self.other_entries.len())
            .finish()
    }
}

/// Every iterator follows this contract and can be composed.
///
/// Results are owned: ownership passes to the caller, which either consumes
/// the result or hands it back to a `ResultPool`. `Display` renders the
/// iterator tree for debugging.
pub trait RowIterator: fmt::Display + Send {
    /// The next result, or `None` when exhausted. Output is strictly
    /// monotonically increasing in row number under full comparison.
    fn next(&mut self) -> Result<Option<IteratorResult>, ScanError>;

    /// Like `next` but skips forward until reaching a result whose row
    /// number compares `>= to` at the given definition level.
    fn seek_to(&mut self, to: RowNumber, definition_level: usize)
        -> Result<Option<IteratorResult>, ScanError>;

    /// Release chunks, pages, buffers. Idempotent; safe after partial
    /// iteration or cancellation.
    fn close(&mut self);
}
