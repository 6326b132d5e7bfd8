//! Hierarchical row numbers for values in nested repeated columns.
//!
//! A `RowNumber` is the sequence of ordinals uniquely identifying a value
//! in a tree of nested columns, starting at the top level and adding one
//! more ordinal per level of nesting. `-1` is the placeholder for levels at
//! which the value is undefined. Comparing two row numbers down to a
//! definition level compares lineages: an equal prefix means both values
//! live under the same ancestor node. For example, given the tree below the
//! row numbers would be:
//!
//! ```text
//! A          0, -1, -1
//!   B        0,  0, -1
//!   C        0,  1, -1
//!     D      0,  1,  0
//!   E        0,  2, -1
//! ```

use std::cmp::Ordering;
use std::fmt;

/// Deepest supported nesting level. Eight levels should be enough for anybody.
pub const MAX_DEFINITION_LEVEL: usize = 7;

/// Position of one value in the nested row tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowNumber([i32; MAX_DEFINITION_LEVEL + 1]);

impl RowNumber {
    /// An empty, invalid row number: undefined at every level.
    pub fn empty() -> Self {
        RowNumber([-1; MAX_DEFINITION_LEVEL + 1])
    }

    /// The maximum(-ish) representable row number, used as the sentinel in
    /// min-searches.
    pub fn max_row() -> Self {
        let mut n = Self::empty();
        n.0[0] = i32::MAX;
        n
    }

    /// A row number is valid once it points at or past the first top-level row.
    pub fn valid(&self) -> bool {
        self.0[0] >= 0
    }

    /// Ordinal at definition level `level`, or `-1` when undefined there.
    pub fn level(&self, level: usize) -> i32 {
        self.0[level]
    }

    /// Lexicographic comparison over positions `[0..=level]`.
    pub fn compare_at(&self, level: usize, other: &RowNumber) -> Ordering {
        for i in 0..=level {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Partial equality down to `level`. A little faster than
    /// `compare_at(level, ..) == Equal`.
    pub fn equal_at(&self, level: usize, other: &RowNumber) -> bool {
        for i in 0..=level {
            if self.0[i] != other.0[i] {
                return false;
            }
        }
        true
    }

    /// Copy of `self` with every position past `level` cleared to undefined.
    pub fn truncate(&self, level: usize) -> RowNumber {
        let mut out = Self::empty();
        out.0[..=level].copy_from_slice(&self.0[..=level]);
        out
    }

    /// Advance to the next value given its repetition and definition levels.
    ///
    /// Increments the ordinal at the repetition level, starts new children
    /// down through the definition level, and clears everything below it.
    /// Worked example from the Dremel paper (`Name.Language.Country`):
    ///
    /// ```text
    /// value  | r | d | resulting row number
    /// -------|---|---|---------------------
    ///        |   |   | { -1, -1, -1, -1 }   <- starting position
    /// us     | 0 | 3 | {  0,  0,  0,  0 }
    /// null   | 2 | 2 | {  0,  0,  1, -1 }
    /// null   | 1 | 1 | {  0,  1, -1, -1 }
    /// gb     | 1 | 3 | {  0,  2,  0,  0 }
    /// null   | 0 | 1 | {  1,  0, -1, -1 }
    /// ```
    pub fn next(&mut self, repetition_level: usize, definition_level: usize, max_definition_level: usize) {
        self.0[repetition_level] += 1;

        for i in repetition_level + 1..=definition_level {
            self.0[i] = 0;
        }

        for i in definition_level + 1..=max_definition_level {
            self.0[i] = -1;
        }
    }

    /// Skip rows at the top level, clearing all nested detail.
    pub fn skip(&mut self, rows: i64) {
        self.0[0] += rows as i32;
        for i in 1..self.0.len() {
            self.0[i] = -1;
        }
    }

    /// The largest representable row number immediately prior to this one
    /// under full-level comparison. Think `next_after` for segmented row
    /// numbers:
    ///
    /// ```text
    /// 1000.0.0   (defined at 3 levels) is preceded by 999.max.max
    /// 1000.-1.-1 (defined at 1 level)  is preceded by 999.-1.-1
    /// ```
    pub fn preceding(&self) -> RowNumber {
        let mut out = *self;
        for i in (0..out.0.len()).rev() {
            match out.0[i] {
                -1 => continue,
                0 => out.0[i] = i32::MAX,
                _ => {
                    out.0[i] -= 1;
                    return out;
                }
            }
        }
        out
    }
}

impl Default for RowNumber {
    fn default() -> Self {
        RowNumber::empty()
    }
}

impl fmt::Debug for RowNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn rn(values: [i32; 8]) -> RowNumber {
        RowNumber(values)
    }

    #[test]
    fn dremel_worked_example() {
        let mut n = RowNumber::empty();

        let steps: [(usize, usize, [i32; 8]); 5] = [
            (0, 3, [0, 0, 0, 0, -1, -1, -1, -1]),
            (2, 2, [0, 0, 1, -1, -1, -1, -1, -1]),
            (1, 1, [0, 1, -1, -1, -1, -1, -1, -1]),
            (1, 3, [0, 2, 0, 0, -1, -1, -1, -1]),
            (0, 1, [1, 0, -1, -1, -1, -1, -1, -1]),
        ];

        for (rep, def, want) in steps {
            n.next(rep, def, 3);
            assert_eq!(n, rn(want), "after next({rep}, {def})");
        }
    }

    #[test]
    fn compare_truncate_identity() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let mut values = [0i32; 8];
            for v in &mut values {
                *v = rng.gen_range(-1..100);
            }
            values[0] = values[0].abs();
            let r = rn(values);
            for level in 0..=MAX_DEFINITION_LEVEL {
                assert_eq!(r.truncate(level).compare_at(level, &r), Ordering::Equal);
                assert_eq!(
                    r.equal_at(level, &r.truncate(level)),
                    true,
                    "equal_at disagrees with compare_at"
                );
            }
        }
    }

    #[test]
    fn equal_at_matches_compare_at() {
        let a = rn([1, 2, 3, -1, -1, -1, -1, -1]);
        let b = rn([1, 2, 4, -1, -1, -1, -1, -1]);
        for level in 0..=MAX_DEFINITION_LEVEL {
            assert_eq!(
                a.equal_at(level, &b),
                a.compare_at(level, &b) == Ordering::Equal
            );
        }
    }

    #[test]
    fn preceding_is_strictly_less_with_no_gap() {
        let cases = [
            rn([1000, 0, 0, -1, -1, -1, -1, -1]),
            rn([1000, -1, -1, -1, -1, -1, -1, -1]),
            rn([5, 3, 0, 0, 0, 0, 0, 0]),
        ];
        for r in cases {
            let p = r.preceding();
            assert_eq!(
                p.compare_at(MAX_DEFINITION_LEVEL, &r),
                Ordering::Less,
                "{p:?} should precede {r:?}"
            );
        }

        // Spot-check the documented shapes.
        assert_eq!(
            rn([1000, 0, 0, -1, -1, -1, -1, -1]).preceding(),
            rn([999, i32::MAX, i32::MAX, -1, -1, -1, -1, -1])
        );
        assert_eq!(
            rn([1000, -1, -1, -1, -1, -1, -1, -1]).preceding(),
            rn([999, -1, -1, -1, -1, -1, -1, -1])
        );
    }

    #[test]
    fn skip_clears_nested_detail() {
        let mut n = rn([3, 4, 5, -1, -1, -1, -1, -1]);
        n.skip(7);
        assert_eq!(n, rn([10, -1, -1, -1, -1, -1, -1, -1]));
    }

    #[test]
    fn invalid_until_first_row() {
        let mut n = RowNumber::empty();
        assert!(!n.valid());
        n.next(0, 0, 0);
        assert!(n.valid());
        assert_eq!(n.level(0), 0);
    }
}
