//! Freelists for per-tuple allocations on the scan hot path.
//!
//! Two pools exist process-wide: the result pool recycles `IteratorResult`
//! shells between calls, and the value-buffer pool recycles the read
//! buffers leaf iterators fill from pages. Both can be replaced per
//! iterator so tests can isolate allocation behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::iter::IteratorResult;
use crate::value::Value;

const MAX_POOLED_RESULTS: usize = 1024;
const MAX_POOLED_BUFFERS_PER_CLASS: usize = 64;

/// Freelist of `IteratorResult`s.
pub struct ResultPool {
    items: Mutex<Vec<IteratorResult>>,
}

impl ResultPool {
    pub fn new() -> Arc<Self> {
        Arc::new(ResultPool {
            items: Mutex::new(Vec::new()),
        })
    }

    /// The process-wide default pool shared by all iterators that were not
    /// given their own.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ResultPool>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(ResultPool::new))
    }

    pub fn get(&self) -> IteratorResult {
        self.items
            .lock()
            .expect("result pool poisoned")
            .pop()
            .unwrap_or_default()
    }

    pub fn put(&self, mut result: IteratorResult) {
        result.reset();
        let mut items = self.items.lock().expect("result pool poisoned");
        if items.len() < MAX_POOLED_RESULTS {
            items.push(result);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.lock().expect("result pool poisoned").len()
    }
}

/// Capacity class for a requested buffer size: the next power of two, so
/// buffers of similar sizes land in the same freelist.
fn capacity_class(capacity: usize) -> usize {
    capacity.max(1).next_power_of_two()
}

fn buffer_pool() -> &'static Mutex<HashMap<usize, Vec<Vec<Value>>>> {
    static POOL: OnceLock<Mutex<HashMap<usize, Vec<Vec<Value>>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Take a cleared value buffer with at least `capacity` slots.
pub fn get_value_buffer(capacity: usize) -> Vec<Value> {
    let class = capacity_class(capacity);
    let mut pool = buffer_pool().lock().expect("value buffer pool poisoned");
    match pool.get_mut(&class).and_then(Vec::pop) {
        Some(buf) => buf,
        None => Vec::with_capacity(class),
    }
}

/// Return a buffer to its capacity class. Contents are cleared first so
/// pooled buffers never pin value payloads.
pub fn put_value_buffer(mut buffer: Vec<Value>) {
    buffer.clear();
    let class = capacity_class(buffer.capacity());
    let mut pool = buffer_pool().lock().expect("value buffer pool poisoned");
    let list = pool.entry(class).or_default();
    if list.len() < MAX_POOLED_BUFFERS_PER_CLASS {
        list.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowNumber;

    #[test]
    fn results_are_reset_on_return() {
        let pool = ResultPool::new();
        let mut result = pool.get();
        result.row_number = RowNumber::max_row();
        result.append_value("k".into(), Value::default());
        pool.put(result);

        let recycled = pool.get();
        assert!(recycled.entries.is_empty());
        assert!(recycled.other_entries.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn buffers_round_trip_through_classes() {
        let buf = get_value_buffer(700);
        assert!(buf.capacity() >= 700);
        put_value_buffer(buf);
        let again = get_value_buffer(700);
        assert!(again.is_empty());
    }
}
