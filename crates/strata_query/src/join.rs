//! Compositional iterators: inner join, left join, union.
//!
//! All three combine child iterators by row-number lineage at a chosen
//! definition level. Children are owned boxed iterators with a peek slot
//! each; composition is by aggregation, never by back-reference. Results
//! are recycled through the configured pool.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::ScanError;
use crate::iter::{IteratorResult, RowIterator};
use crate::pool::ResultPool;
use crate::predicate::GroupPredicate;
use crate::row::RowNumber;

fn render_children(f: &mut fmt::Formatter<'_>, iters: &[Box<dyn RowIterator>]) -> fmt::Result {
    for (i, it) in iters.iter().enumerate() {
        if i > 0 {
            f.write_str("; ")?;
        }
        write!(f, "{it}")?;
    }
    Ok(())
}

/// Joins two or more iterators for matches at the given definition level.
/// Joining at level 0 means every child must produce a result within the
/// same top-level row.
pub struct JoinIterator {
    definition_level: usize,
    iters: Vec<Box<dyn RowIterator>>,
    peeks: Vec<Option<IteratorResult>>,
    predicate: Option<Box<dyn GroupPredicate>>,
    pool: Arc<ResultPool>,
}

impl JoinIterator {
    pub fn new(
        definition_level: usize,
        iters: Vec<Box<dyn RowIterator>>,
        predicate: Option<Box<dyn GroupPredicate>>,
    ) -> Self {
        let peeks = iters.iter().map(|_| None).collect();
        JoinIterator {
            definition_level,
            iters,
            peeks,
            predicate,
            pool: ResultPool::shared(),
        }
    }

    pub fn with_pool(mut self, pool: Arc<ResultPool>) -> Self {
        self.pool = pool;
        self
    }

    fn peek(&mut self, i: usize) -> Result<bool, ScanError> {
        if self.peeks[i].is_none() {
            self.peeks[i] = self.iters[i].next()?;
        }
        Ok(self.peeks[i].is_some())
    }

    fn seek_child(&mut self, i: usize, target: &RowNumber) -> Result<(), ScanError> {
        let t = target.truncate(self.definition_level);
        let needs_seek = match &self.peeks[i] {
            None => true,
            Some(p) => p.row_number.compare_at(self.definition_level, &t) == Ordering::Less,
        };
        if needs_seek {
            if let Some(old) = self.peeks[i].take() {
                self.pool.put(old);
            }
            self.peeks[i] = self.iters[i].seek_to(t, self.definition_level)?;
        }
        Ok(())
    }

    /// Collect data from every child still pointing at `row_number`,
    /// advancing each past the group.
    fn collect(&mut self, row_number: RowNumber) -> Result<IteratorResult, ScanError> {
        let mut result = self.pool.get();
        result.row_number = row_number;

        for i in 0..self.iters.len() {
            loop {
                let matches = match &self.peeks[i] {
                    Some(p) => p.row_number.equal_at(self.definition_level, &row_number),
                    None => false,
                };
                if !matches {
                    break;
                }
                let mut taken = self.peeks[i].take().expect("peek present");
                result.append(&mut taken);
                self.pool.put(taken);
                self.peeks[i] = self.iters[i].next()?;
            }
        }
        Ok(result)
    }
}

impl RowIterator for JoinIterator {
    fn next(&mut self) -> Result<Option<IteratorResult>, ScanError> {
        'outer: loop {
            // First pass: peek every child and bail early if any is already
            // exhausted. On later passes the first peek is only empty once
            // everything is drained.
            if self.peeks[0].is_none() {
                for i in 0..self.iters.len() {
                    if !self.peek(i)? {
                        return Ok(None);
                    }
                }
            }

            // The first child points at the next candidate row; walk the
            // rest forward to it.
            let target = self.peeks[0].as_ref().expect("peeked").row_number;
            for i in 1..self.iters.len() {
                self.seek_child(i, &target)?;

                let peek_row = match &self.peeks[i] {
                    Some(peek) => peek.row_number,
                    None => return Ok(None),
                };

                if peek_row.compare_at(self.definition_level, &target) == Ordering::Greater {
                    // This child overshot every previous one, which means it
                    // has the higher filtering power. Swap it to the front
                    // so it drives advancement, and restart.
                    self.iters.swap(0, i);
                    self.peeks.swap(0, i);
                    continue 'outer;
                }
            }

            // All children agree on the row.
            let mut result = self.collect(target)?;

            if let Some(p) = self.predicate.as_mut() {
                if !p.keep_group(&mut result) {
                    self.pool.put(result);
                    continue;
                }
            }
            return Ok(Some(result));
        }
    }

    fn seek_to(
        &mut self,
        to: RowNumber,
        definition_level: usize,
    ) -> Result<Option<IteratorResult>, ScanError> {
        let t = to.truncate(definition_level);
        for i in 0..self.iters.len() {
            let needs_seek = match &self.peeks[i] {
                None => true,
                Some(p) => p.row_number.compare_at(definition_level, &t) == Ordering::Less,
            };
            if needs_seek {
                if let Some(old) = self.peeks[i].take() {
                    self.pool.put(old);
                }
                self.peeks[i] = self.iters[i].seek_to(t, definition_level)?;
                if self.peeks[i].is_none() {
                    // This child is exhausted; no reason to seek the rest.
                    break;
                }
            }
        }
        self.next()
    }

    fn close(&mut self) {
        for iter in &mut self.iters {
            iter.close();
        }
        for peek in &mut self.peeks {
            if let Some(result) = peek.take() {
                self.pool.put(result);
            }
        }
    }
}

impl fmt::Display for JoinIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinIterator(level={}, children=[", self.definition_level)?;
        render_children(f, &self.iters)?;
        f.write_str("])")
    }
}

/// Like `JoinIterator` but with two child sets: all `required` children
/// must match for a result; `optional` children are collected only when
/// they align with the matched row.
pub struct LeftJoinIterator {
    definition_level: usize,
    required: Vec<Box<dyn RowIterator>>,
    optional: Vec<Box<dyn RowIterator>>,
    peeks_required: Vec<Option<IteratorResult>>,
    peeks_optional: Vec<Option<IteratorResult>>,
    predicate: Option<Box<dyn GroupPredicate>>,
    pool: Arc<ResultPool>,
}

impl LeftJoinIterator {
    pub fn new(
        definition_level: usize,
        required: Vec<Box<dyn RowIterator>>,
        optional: Vec<Box<dyn RowIterator>>,
        predicate: Option<Box<dyn GroupPredicate>>,
    ) -> Result<Self, ScanError> {
        // A left join with no required children would loop forever; a query
        // that produces one is a bug in the tree-building code.
        if required.is_empty() {
            return Err(ScanError::InvalidIterator(
                "left join requires at least one required iterator".into(),
            ));
        }
        let peeks_required = required.iter().map(|_| None).collect();
        let peeks_optional = optional.iter().map(|_| None).collect();
        Ok(LeftJoinIterator {
            definition_level,
            required,
            optional,
            peeks_required,
            peeks_optional,
            predicate,
            pool: ResultPool::shared(),
        })
    }

    pub fn with_pool(mut self, pool: Arc<ResultPool>) -> Self {
        self.pool = pool;
        self
    }

    fn peek_required(&mut self, i: usize) -> Result<bool, ScanError> {
        if self.peeks_required[i].is_none() {
            self.peeks_required[i] = self.required[i].next()?;
        }
        Ok(self.peeks_required[i].is_some())
    }

    fn seek_required(&mut self, i: usize, target: &RowNumber) -> Result<(), ScanError> {
        let needs_seek = match &self.peeks_required[i] {
            None => true,
            Some(p) => p.row_number.compare_at(self.definition_level, target) == Ordering::Less,
        };
        if needs_seek {
            if let Some(old) = self.peeks_required[i].take() {
                self.pool.put(old);
            }
            self.peeks_required[i] = self.required[i].seek_to(*target, self.definition_level)?;
        }
        Ok(())
    }

    fn seek_all_required(&mut self, target: &RowNumber) -> Result<bool, ScanError> {
        for i in 0..self.required.len() {
            self.seek_required(i, target)?;
            if self.peeks_required[i].is_none() {
                // A required child is exhausted; no reason to seek the rest.
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn seek_all_optional(&mut self, target: &RowNumber) -> Result<(), ScanError> {
        for i in 0..self.optional.len() {
            let needs_seek = match &self.peeks_optional[i] {
                None => true,
                Some(p) => p.row_number.compare_at(self.definition_level, target) == Ordering::Less,
            };
            if needs_seek {
                if let Some(old) = self.peeks_optional[i].take() {
                    self.pool.put(old);
                }
                self.peeks_optional[i] = self.optional[i].seek_to(*target, self.definition_level)?;
            }
        }
        Ok(())
    }

    /// Collect the matched group. Only called once every required child has
    /// matched, so the optionals just need to be walked to the same place.
    fn collect(&mut self, row_number: RowNumber) -> Result<IteratorResult, ScanError> {
        self.seek_all_optional(&row_number)?;

        let mut result = self.pool.get();
        result.row_number = row_number;

        for i in 0..self.required.len() {
            loop {
                let matches = match &self.peeks_required[i] {
                    Some(p) => p.row_number.equal_at(self.definition_level, &row_number),
                    None => false,
                };
                if !matches {
                    break;
                }
                let mut taken = self.peeks_required[i].take().expect("peek present");
                result.append(&mut taken);
                self.pool.put(taken);
                self.peeks_required[i] = self.required[i].next()?;
            }
        }
        for i in 0..self.optional.len() {
            loop {
                let matches = match &self.peeks_optional[i] {
                    Some(p) => p.row_number.equal_at(self.definition_level, &row_number),
                    None => false,
                };
                if !matches {
                    break;
                }
                let mut taken = self.peeks_optional[i].take().expect("peek present");
                result.append(&mut taken);
                self.pool.put(taken);
                self.peeks_optional[i] = self.optional[i].next()?;
            }
        }
        Ok(result)
    }
}

impl RowIterator for LeftJoinIterator {
    fn next(&mut self) -> Result<Option<IteratorResult>, ScanError> {
        'outer: loop {
            if self.peeks_required[0].is_none() {
                for i in 0..self.required.len() {
                    if !self.peek_required(i)? {
                        return Ok(None);
                    }
                }
            }

            let target = self.peeks_required[0].as_ref().expect("peeked").row_number;
            for i in 1..self.required.len() {
                self.seek_required(i, &target)?;

                let peek_row = match &self.peeks_required[i] {
                    Some(peek) => peek.row_number,
                    // Exhausted, no more joins possible.
                    None => return Ok(None),
                };

                if peek_row.compare_at(self.definition_level, &target) == Ordering::Greater {
                    // Highest row number first: it has the most filtering
                    // power, so let it drive.
                    self.required.swap(0, i);
                    self.peeks_required.swap(0, i);
                    continue 'outer;
                }
            }

            let mut result = self.collect(target)?;

            if let Some(p) = self.predicate.as_mut() {
                if !p.keep_group(&mut result) {
                    self.pool.put(result);
                    continue;
                }
            }
            return Ok(Some(result));
        }
    }

    fn seek_to(
        &mut self,
        to: RowNumber,
        definition_level: usize,
    ) -> Result<Option<IteratorResult>, ScanError> {
        let t = to.truncate(definition_level);
        if self.seek_all_required(&t)? {
            // A required child is exhausted.
            return Ok(None);
        }
        self.seek_all_optional(&t)?;
        self.next()
    }

    fn close(&mut self) {
        for iter in self.required.iter_mut().chain(self.optional.iter_mut()) {
            iter.close();
        }
        for peek in self
            .peeks_required
            .iter_mut()
            .chain(self.peeks_optional.iter_mut())
        {
            if let Some(result) = peek.take() {
                self.pool.put(result);
            }
        }
    }
}

impl fmt::Display for LeftJoinIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeftJoinIterator(level={}, required=[", self.definition_level)?;
        render_children(f, &self.required)?;
        f.write_str("], optional=[")?;
        render_children(f, &self.optional)?;
        f.write_str("])")
    }
}

/// Produces all results from all children. Children aligned on the same row
/// at the configured definition level are emitted together; otherwise the
/// lowest row wins.
pub struct UnionIterator {
    definition_level: usize,
    iters: Vec<Box<dyn RowIterator>>,
    peeks: Vec<Option<IteratorResult>>,
    lowest: Vec<usize>,
    predicate: Option<Box<dyn GroupPredicate>>,
    pool: Arc<ResultPool>,
}

impl UnionIterator {
    pub fn new(
        definition_level: usize,
        iters: Vec<Box<dyn RowIterator>>,
        predicate: Option<Box<dyn GroupPredicate>>,
    ) -> Self {
        let peeks = iters.iter().map(|_| None).collect();
        UnionIterator {
            definition_level,
            iters,
            peeks,
            lowest: Vec::new(),
            predicate,
            pool: ResultPool::shared(),
        }
    }

    pub fn with_pool(mut self, pool: Arc<ResultPool>) -> Self {
        self.pool = pool;
        self
    }

    fn peek(&mut self, i: usize) -> Result<(), ScanError> {
        if self.peeks[i].is_none() {
            self.peeks[i] = self.iters[i].next()?;
        }
        Ok(())
    }

    fn collect(&mut self, tied: &[usize], row_number: RowNumber) -> Result<IteratorResult, ScanError> {
        let mut result = self.pool.get();
        result.row_number = row_number;

        for &i in tied {
            loop {
                let matches = match &self.peeks[i] {
                    Some(p) => p.row_number.equal_at(self.definition_level, &row_number),
                    None => false,
                };
                if !matches {
                    break;
                }
                let mut taken = self.peeks[i].take().expect("peek present");
                result.append(&mut taken);
                self.pool.put(taken);
                self.peeks[i] = self.iters[i].next()?;
            }
        }
        Ok(result)
    }
}

impl RowIterator for UnionIterator {
    fn next(&mut self) -> Result<Option<IteratorResult>, ScanError> {
        // Each pass remembers which children point at the earliest same row,
        // collects those, and produces one result. Repeat until all children
        // are exhausted.
        loop {
            let mut lowest_row = RowNumber::max_row();
            let mut tied = std::mem::take(&mut self.lowest);
            tied.clear();

            for i in 0..self.iters.len() {
                self.peek(i)?;
                let Some(peek) = &self.peeks[i] else {
                    // Exhausted; on to the next child.
                    continue;
                };
                match peek.row_number.compare_at(self.definition_level, &lowest_row) {
                    Ordering::Less => {
                        tied.clear();
                        lowest_row = peek.row_number;
                        tied.push(i);
                    }
                    Ordering::Equal => tied.push(i),
                    Ordering::Greater => {}
                }
            }

            if tied.is_empty() {
                // All exhausted.
                self.lowest = tied;
                return Ok(None);
            }

            let mut result = self.collect(&tied, lowest_row)?;
            self.lowest = tied;

            if let Some(p) = self.predicate.as_mut() {
                if !p.keep_group(&mut result) {
                    self.pool.put(result);
                    continue;
                }
            }
            return Ok(Some(result));
        }
    }

    fn seek_to(
        &mut self,
        to: RowNumber,
        definition_level: usize,
    ) -> Result<Option<IteratorResult>, ScanError> {
        let t = to.truncate(definition_level);
        for i in 0..self.iters.len() {
            let needs_seek = match &self.peeks[i] {
                None => true,
                Some(p) => p.row_number.compare_at(definition_level, &t) == Ordering::Less,
            };
            if needs_seek {
                if let Some(old) = self.peeks[i].take() {
                    self.pool.put(old);
                }
                self.peeks[i] = self.iters[i].seek_to(t, definition_level)?;
            }
        }
        self.next()
    }

    fn close(&mut self) {
        for iter in &mut self.iters {
            iter.close();
        }
        for peek in &mut self.peeks {
            if let Some(result) = peek.take() {
                self.pool.put(result);
            }
        }
    }
}

impl fmt::Display for UnionIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnionIterator(level={}, children=[", self.definition_level)?;
        render_children(f, &self.iters)?;
        f.write_str("])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemRowGroup;
    use crate::predicate::CallbackPredicate;
    use crate::sync::{SyncIterator, SyncOptions};
    use crate::value::{Value, ValueKind};
    use crate::MAX_DEFINITION_LEVEL;

    fn flat_column(n: i64) -> Vec<Value> {
        (0..n).map(|v| Value::new(ValueKind::Int(v), 0, 0)).collect()
    }

    fn shared_groups(n: i64) -> Vec<std::sync::Arc<dyn crate::RowGroup>> {
        vec![MemRowGroup::new(vec![flat_column(n)], n as u64, 10)]
    }

    fn modulo_iter(n: i64, modulo: i64, select_as: &str) -> Box<dyn RowIterator> {
        Box::new(SyncIterator::new(
            shared_groups(n),
            0,
            SyncOptions {
                predicate: Some(Box::new(CallbackPredicate::new("mod", move |v: &Value| {
                    v.as_int().map(|i| i % modulo == 0).unwrap_or(false)
                }))),
                select_as: Some(select_as.into()),
                ..Default::default()
            },
        ))
    }

    fn drain(iter: &mut dyn RowIterator) -> Vec<IteratorResult> {
        let mut out = Vec::new();
        while let Some(res) = iter.next().unwrap() {
            out.push(res);
        }
        out
    }

    fn top_rows(results: &[IteratorResult]) -> Vec<i32> {
        results.iter().map(|r| r.row_number.level(0)).collect()
    }

    #[test]
    fn inner_join_intersects_children() {
        let mut join = JoinIterator::new(
            0,
            vec![modulo_iter(100, 2, "a"), modulo_iter(100, 3, "b")],
            None,
        );
        let results = drain(&mut join);
        let want: Vec<i32> = (0..100).filter(|v| v % 6 == 0).collect();
        assert_eq!(top_rows(&results), want);
        // Each result carries entries from both children.
        for r in &results {
            assert_eq!(r.entries.len(), 2);
        }
        join.close();
    }

    #[test]
    fn inner_join_with_itself_is_identity() {
        let mut single = modulo_iter(200, 7, "v");
        let single_rows = top_rows(&drain(single.as_mut()));
        single.close();

        let mut join = JoinIterator::new(
            0,
            vec![modulo_iter(200, 7, "v"), modulo_iter(200, 7, "v")],
            None,
        );
        let joined = drain(&mut join);
        assert_eq!(top_rows(&joined), single_rows);
        // Entries are duplicated, one per child.
        assert!(joined.iter().all(|r| r.entries.len() == 2));
        join.close();
    }

    #[test]
    fn join_results_are_monotonic() {
        let mut join = JoinIterator::new(
            0,
            vec![modulo_iter(500, 3, "a"), modulo_iter(500, 5, "b")],
            None,
        );
        let results = drain(&mut join);
        for pair in results.windows(2) {
            assert_eq!(
                pair[0]
                    .row_number
                    .compare_at(MAX_DEFINITION_LEVEL, &pair[1].row_number),
                Ordering::Less
            );
        }
        join.close();
    }

    #[test]
    fn join_group_predicate_drops_groups() {
        struct EvenTopRow;
        impl fmt::Display for EvenTopRow {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("even-top-row")
            }
        }
        impl GroupPredicate for EvenTopRow {
            fn keep_group(&mut self, result: &mut IteratorResult) -> bool {
                result.row_number.level(0) % 2 == 0
            }
        }

        let mut join = JoinIterator::new(
            0,
            vec![modulo_iter(100, 3, "a"), modulo_iter(100, 3, "b")],
            Some(Box::new(EvenTopRow)),
        );
        let results = drain(&mut join);
        let want: Vec<i32> = (0..100).filter(|v| v % 3 == 0 && v % 2 == 0).collect();
        assert_eq!(top_rows(&results), want);
        join.close();
    }

    #[test]
    fn join_seek_to_advances_all_children() {
        let mut join = JoinIterator::new(
            0,
            vec![modulo_iter(100, 2, "a"), modulo_iter(100, 3, "b")],
            None,
        );
        let mut target = RowNumber::empty();
        target.skip(51);
        let res = join.seek_to(target, 0).unwrap().unwrap();
        assert_eq!(res.row_number.level(0), 54);
        join.close();
    }

    #[test]
    fn left_join_requires_required() {
        assert!(matches!(
            LeftJoinIterator::new(0, Vec::new(), vec![modulo_iter(10, 2, "o")], None),
            Err(ScanError::InvalidIterator(_))
        ));
    }

    #[test]
    fn left_join_count_matches_inner_join_on_required() {
        let mut inner = JoinIterator::new(
            0,
            vec![modulo_iter(300, 4, "a"), modulo_iter(300, 6, "b")],
            None,
        );
        let inner_rows = top_rows(&drain(&mut inner));
        inner.close();

        let mut left = LeftJoinIterator::new(
            0,
            vec![modulo_iter(300, 4, "a"), modulo_iter(300, 6, "b")],
            vec![modulo_iter(300, 5, "opt")],
            None,
        )
        .unwrap();
        let left_results = drain(&mut left);
        // Optionals change entries, never the emission count.
        assert_eq!(top_rows(&left_results), inner_rows);
        for r in &left_results {
            let has_opt = r.entries.iter().any(|(k, _)| &**k == "opt");
            let expected = r.row_number.level(0) % 5 == 0;
            assert_eq!(has_opt, expected, "row {}", r.row_number.level(0));
        }
        left.close();
    }

    #[test]
    fn union_emits_every_child_row_once() {
        let mut union = UnionIterator::new(
            0,
            vec![modulo_iter(100, 2, "a"), modulo_iter(100, 3, "b")],
            None,
        );
        let results = drain(&mut union);
        let want: Vec<i32> = (0..100).filter(|v| v % 2 == 0 || v % 3 == 0).collect();
        assert_eq!(top_rows(&results), want);
        // Rows matched by both children carry both entries in one result.
        for r in &results {
            let row = r.row_number.level(0);
            let want_len = usize::from(row % 2 == 0) + usize::from(row % 3 == 0);
            assert_eq!(r.entries.len(), want_len, "row {row}");
        }
        union.close();
    }

    #[test]
    fn union_seek_to_skips_all_children() {
        let mut union = UnionIterator::new(
            0,
            vec![modulo_iter(100, 2, "a"), modulo_iter(100, 3, "b")],
            None,
        );
        let mut target = RowNumber::empty();
        target.skip(91);
        let res = union.seek_to(target, 0).unwrap().unwrap();
        assert_eq!(res.row_number.level(0), 90);
        union.close();
    }

    #[test]
    fn key_value_group_predicate_filters_attribute_maps() {
        use crate::predicate::KeyValueGroupPredicate;
        use bytes::Bytes;

        // Two parallel nested columns: attribute keys and values, two
        // entries per row. Row i has {env: prod|dev, team: core}.
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for row in 0..6i64 {
            let env = if row % 2 == 0 { "prod" } else { "dev" };
            for (i, (k, v)) in [("env", env), ("team", "core")].iter().enumerate() {
                let rep = if i == 0 { 0 } else { 1 };
                keys.push(Value::new(
                    ValueKind::Bytes(Bytes::from(k.to_string())),
                    rep,
                    1,
                ));
                values.push(Value::new(
                    ValueKind::Bytes(Bytes::from(v.to_string())),
                    rep,
                    1,
                ));
            }
        }
        let rg = MemRowGroup::new(vec![keys, values], 6, 2);
        let make = |column: usize, select: &str| -> Box<dyn RowIterator> {
            Box::new(SyncIterator::new(
                vec![rg.clone()],
                column,
                SyncOptions {
                    select_as: Some(select.into()),
                    max_definition_level: 1,
                    ..Default::default()
                },
            ))
        };

        let mut join = JoinIterator::new(
            0,
            vec![make(0, "keys"), make(1, "values")],
            Some(Box::new(KeyValueGroupPredicate::new(&[
                ("env", "prod"),
                ("team", "core"),
            ]))),
        );
        let results = drain(&mut join);
        let got: Vec<i32> = top_rows(&results);
        assert_eq!(got, vec![0, 2, 4]);
        join.close();
    }

    #[test]
    fn nested_join_aligns_at_parent_level() {
        // Column with two values per row at level 1; join the column with
        // itself at level 0 groups both values of the row together.
        let values: Vec<Value> = (0..10)
            .flat_map(|row| {
                vec![
                    Value::new(ValueKind::Int(row * 2), 0, 1),
                    Value::new(ValueKind::Int(row * 2 + 1), 1, 1),
                ]
            })
            .collect();
        let make_iter = |select: &str| -> Box<dyn RowIterator> {
            Box::new(SyncIterator::new(
                vec![MemRowGroup::new(vec![values.clone()], 10, 4)],
                0,
                SyncOptions {
                    select_as: Some(select.into()),
                    max_definition_level: 1,
                    ..Default::default()
                },
            ))
        };

        let mut join = JoinIterator::new(0, vec![make_iter("l"), make_iter("r")], None);
        let results = drain(&mut join);
        assert_eq!(results.len(), 10);
        // Two values per child collect into one group per row.
        for r in &results {
            assert_eq!(r.entries.len(), 4);
        }
        join.close();
    }
}
