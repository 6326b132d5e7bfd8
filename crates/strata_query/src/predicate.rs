//! Pluggable filters applied during column scans.
//!
//! A predicate can veto work at three granularities: a whole column chunk
//! before it is opened, a page before it is scanned, and each value. The
//! chunk and page checks default to keeping everything; most predicates
//! only refine the per-value check. Group predicates run at a fourth
//! granularity, on assembled groups inside compositional iterators.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

use crate::block::{ColumnChunk, Page};
use crate::iter::IteratorResult;
use crate::value::Value;

/// Comparison operator shared by the scalar predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::NotEq => ord != Ordering::Equal,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Gte => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Lte => ord != Ordering::Greater,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "!=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        };
        f.write_str(s)
    }
}

/// Per-chunk / per-page / per-value filter. Predicates are pure: returning
/// false makes the iterator skip to the next candidate.
pub trait Predicate: fmt::Display + Send {
    fn keep_column_chunk(&mut self, _chunk: &dyn ColumnChunk) -> bool {
        true
    }

    fn keep_page(&mut self, _page: &dyn Page) -> bool {
        true
    }

    fn keep_value(&mut self, value: &Value) -> bool;
}

/// Integer comparison. Null and non-integer values never match.
pub struct IntPredicate {
    pub op: CmpOp,
    pub operand: i64,
}

impl Predicate for IntPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        match value.as_int() {
            Some(v) => self.op.matches(v.cmp(&self.operand)),
            None => false,
        }
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "int {} {}", self.op, self.operand)
    }
}

/// Float comparison. Incomparable (NaN) never matches.
pub struct FloatPredicate {
    pub op: CmpOp,
    pub operand: f64,
}

impl Predicate for FloatPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        match value.as_double().and_then(|v| v.partial_cmp(&self.operand)) {
            Some(ord) => self.op.matches(ord),
            None => false,
        }
    }
}

impl fmt::Display for FloatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "float {} {}", self.op, self.operand)
    }
}

/// Boolean equality.
pub struct BoolPredicate {
    pub operand: bool,
    pub negate: bool,
}

impl Predicate for BoolPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        match value.as_bool() {
            Some(v) => (v == self.operand) != self.negate,
            None => false,
        }
    }
}

impl fmt::Display for BoolPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bool {} {}", if self.negate { "!=" } else { "=" }, self.operand)
    }
}

/// Byte-for-byte string comparison.
pub struct BytesPredicate {
    pub operand: Bytes,
    pub negate: bool,
}

impl BytesPredicate {
    pub fn equal(operand: impl Into<Bytes>) -> Self {
        BytesPredicate {
            operand: operand.into(),
            negate: false,
        }
    }

    pub fn not_equal(operand: impl Into<Bytes>) -> Self {
        BytesPredicate {
            operand: operand.into(),
            negate: true,
        }
    }
}

impl Predicate for BytesPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        match value.as_bytes() {
            Some(b) => (*b == self.operand) != self.negate,
            None => false,
        }
    }
}

impl fmt::Display for BytesPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes {} {:?}",
            if self.negate { "!=" } else { "=" },
            String::from_utf8_lossy(&self.operand)
        )
    }
}

/// Regex match over string values.
pub struct RegexPredicate {
    pub regex: regex::bytes::Regex,
    pub negate: bool,
}

impl RegexPredicate {
    pub fn matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(RegexPredicate {
            regex: regex::bytes::Regex::new(pattern)?,
            negate: false,
        })
    }

    pub fn not_matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(RegexPredicate {
            regex: regex::bytes::Regex::new(pattern)?,
            negate: true,
        })
    }
}

impl Predicate for RegexPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        match value.as_bytes() {
            Some(b) => self.regex.is_match(b) != self.negate,
            None => false,
        }
    }
}

impl fmt::Display for RegexPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regex {} {}",
            if self.negate { "!~" } else { "=~" },
            self.regex.as_str()
        )
    }
}

/// Keeps any defined value: the presence test.
pub struct NonNullPredicate;

impl Predicate for NonNullPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        !value.is_null()
    }
}

impl fmt::Display for NonNullPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("non-null")
    }
}

/// Closure escape hatch for one-off filters.
pub struct CallbackPredicate {
    callback: Box<dyn FnMut(&Value) -> bool + Send>,
    description: String,
}

impl CallbackPredicate {
    pub fn new(description: impl Into<String>, callback: impl FnMut(&Value) -> bool + Send + 'static) -> Self {
        CallbackPredicate {
            callback: Box::new(callback),
            description: description.into(),
        }
    }
}

impl Predicate for CallbackPredicate {
    fn keep_value(&mut self, value: &Value) -> bool {
        (self.callback)(value)
    }
}

impl fmt::Display for CallbackPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback({})", self.description)
    }
}

/// Filter over an assembled group inside a compositional iterator. The
/// result is mutable so collectors can transform entries in place while
/// deciding whether to keep the group.
pub trait GroupPredicate: fmt::Display + Send {
    fn keep_group(&mut self, result: &mut IteratorResult) -> bool;
}

/// Checks that a group's paired `keys`/`values` columns contain every
/// requested key/value pair byte-for-byte. This realizes attribute-map
/// membership over a key column joined with its value column.
pub struct KeyValueGroupPredicate {
    keys: Vec<Bytes>,
    values: Vec<Bytes>,
}

impl KeyValueGroupPredicate {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        KeyValueGroupPredicate {
            keys: pairs.iter().map(|(k, _)| Bytes::from(k.to_string())).collect(),
            values: pairs.iter().map(|(_, v)| Bytes::from(v.to_string())).collect(),
        }
    }
}

impl GroupPredicate for KeyValueGroupPredicate {
    fn keep_group(&mut self, result: &mut IteratorResult) -> bool {
        let columns = result.columns(&["keys", "values"]);
        let (keys, values) = (&columns[0], &columns[1]);

        if keys.len() < self.keys.len() || keys.len() != values.len() {
            // Missing data or unsatisfiable condition.
            return false;
        }

        for (want_key, want_value) in self.keys.iter().zip(&self.values) {
            let mut found = false;
            for (key, value) in keys.iter().zip(values) {
                if key.as_bytes() == Some(want_key) && value.as_bytes() == Some(want_value) {
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for KeyValueGroupPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kv-group({} pairs)", self.keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn int(v: i64) -> Value {
        Value::new(ValueKind::Int(v), 0, 0)
    }

    fn string(s: &str) -> Value {
        Value::new(ValueKind::Bytes(Bytes::from(s.to_string())), 0, 0)
    }

    #[test]
    fn int_comparisons() {
        let mut eq = IntPredicate { op: CmpOp::Eq, operand: 5 };
        assert!(eq.keep_value(&int(5)));
        assert!(!eq.keep_value(&int(6)));
        assert!(!eq.keep_value(&Value::null(0, 0)));
        assert!(!eq.keep_value(&string("5")));

        let mut gte = IntPredicate { op: CmpOp::Gte, operand: 5 };
        assert!(gte.keep_value(&int(5)));
        assert!(gte.keep_value(&int(50)));
        assert!(!gte.keep_value(&int(4)));
    }

    #[test]
    fn bytes_and_regex() {
        let mut eq = BytesPredicate::equal("hello");
        assert!(eq.keep_value(&string("hello")));
        assert!(!eq.keep_value(&string("world")));
        assert!(!eq.keep_value(&Value::null(0, 0)));

        let mut ne = BytesPredicate::not_equal("hello");
        assert!(!ne.keep_value(&string("hello")));
        assert!(ne.keep_value(&string("world")));
        // Not-equal is still a match on defined values only.
        assert!(!ne.keep_value(&Value::null(0, 0)));

        let mut re = RegexPredicate::matching("^h.*o$").unwrap();
        assert!(re.keep_value(&string("hello")));
        assert!(!re.keep_value(&string("world")));
        assert!(!re.keep_value(&Value::null(0, 0)));
    }

    #[test]
    fn non_null_is_the_presence_test() {
        let mut p = NonNullPredicate;
        assert!(p.keep_value(&int(0)));
        assert!(p.keep_value(&string("")));
        assert!(!p.keep_value(&Value::null(0, 2)));
    }

    #[test]
    fn key_value_group_membership() {
        let mut result = IteratorResult::default();
        result.append_value("keys".into(), string("cluster"));
        result.append_value("values".into(), string("prod"));
        result.append_value("keys".into(), string("namespace"));
        result.append_value("values".into(), string("loadgen"));

        let mut want_both = KeyValueGroupPredicate::new(&[("cluster", "prod"), ("namespace", "loadgen")]);
        assert!(want_both.keep_group(&mut result));

        let mut wrong_value = KeyValueGroupPredicate::new(&[("cluster", "dev")]);
        assert!(!wrong_value.keep_group(&mut result));

        let mut missing_key = KeyValueGroupPredicate::new(&[("region", "us-east")]);
        assert!(!missing_key.keep_group(&mut result));

        let mut too_many = KeyValueGroupPredicate::new(&[
            ("cluster", "prod"),
            ("namespace", "loadgen"),
            ("region", "us-east"),
        ]);
        assert!(!too_many.keep_group(&mut result));
    }
}
