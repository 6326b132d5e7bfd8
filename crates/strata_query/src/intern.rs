//! Per-iterator string interning for low-cardinality columns.

use std::collections::HashSet;

use bytes::Bytes;

/// Deduplicates byte strings so repeated values share one backing
/// allocation for the lifetime of the owning iterator. Not worth it for
/// high-cardinality columns such as span or trace ids.
#[derive(Default)]
pub struct Interner {
    seen: HashSet<Bytes>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    /// The canonical copy of `bytes`, inserting it on first sight.
    pub fn intern(&mut self, bytes: &Bytes) -> Bytes {
        match self.seen.get(bytes) {
            Some(existing) => existing.clone(),
            None => {
                self.seen.insert(bytes.clone());
                bytes.clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
