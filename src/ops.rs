//! Shared Operation Vocabulary
//!
//! The pieces of the contract that every adapter must agree on byte for byte
//! live here, so no adapter re-derives them:
//!
//! - the canonical sorted-set ordering and its comparator
//! - negative-index range normalization, shared by lists and sorted sets
//! - score bounds with explicit infinity sentinels
//! - the transaction batch vocabulary ([`Op`] and [`OpResult`])

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    /// Member identity, unique within its set
    pub member: String,
    /// The member's score
    pub score: f64,
}

/// One bound of a score range.
///
/// The unbounded variants exist so that adapters can translate "no bound"
/// into an omitted comparison. A literal infinity never reaches a numeric
/// column comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScoreBound {
    /// No lower limit
    NegInf,
    /// An inclusive finite bound
    Value(f64),
    /// No upper limit
    PosInf,
}

impl ScoreBound {
    /// Whether `score` satisfies this bound as a minimum.
    pub fn admits_as_min(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => true,
            ScoreBound::Value(min) => score >= *min,
            ScoreBound::PosInf => false,
        }
    }

    /// Whether `score` satisfies this bound as a maximum.
    pub fn admits_as_max(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => false,
            ScoreBound::Value(max) => score <= *max,
            ScoreBound::PosInf => true,
        }
    }
}

/// Canonical sorted-set ordering: score ascending, ties by member ascending.
///
/// Reverse queries return the exact reverse of this order. Every adapter's
/// sort clause is written to agree with this comparator.
pub fn cmp_score_member(s1: f64, m1: &str, s2: f64, m2: &str) -> Ordering {
    s1.total_cmp(&s2).then_with(|| m1.cmp(m2))
}

/// Slice `items` by an inclusive `[start, stop]` range where negative values
/// count back from the end (`-1` is the last element).
///
/// Out-of-range bounds clamp; an inverted range yields an empty result. The
/// same normalization serves list ranges and sorted-set ranges on every
/// adapter.
pub fn slice_range<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
    let len = items.len() as i64;
    if len == 0 {
        return Vec::new();
    }

    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return Vec::new();
    }

    items[start as usize..=stop as usize].to_vec()
}

/// One operation inside a transaction batch.
///
/// The variants cover the write-side vocabulary plus `Get`; each executes
/// with the same observable semantics as its standalone counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    /// Set a scalar key, optionally with a TTL in seconds
    Set {
        key: String,
        value: Value,
        ttl_seconds: Option<i64>,
    },
    /// Read a scalar key
    Get { key: String },
    /// Delete a scalar key
    Delete { key: String },
    /// Increment a scalar integer
    Incr { key: String, amount: i64 },
    /// Set a TTL on an existing scalar key
    Expire { key: String, seconds: i64 },
    /// Add or update a sorted-set member
    Zadd {
        key: String,
        score: f64,
        member: String,
    },
    /// Remove a sorted-set member
    Zrem { key: String, member: String },
    /// Increment a sorted-set member's score
    Zincrby {
        key: String,
        delta: f64,
        member: String,
    },
    /// Push values onto the head of a list
    Lpush { key: String, values: Vec<Value> },
    /// Push values onto the tail of a list
    Rpush { key: String, values: Vec<Value> },
    /// Add members to a set
    Sadd { key: String, members: Vec<Value> },
    /// Remove members from a set
    Srem { key: String, members: Vec<Value> },
    /// Set a hash field
    Hset {
        key: String,
        field: String,
        value: Value,
    },
    /// Delete hash fields
    Hdel { key: String, fields: Vec<String> },
    /// Increment a hash field
    Hincrby {
        key: String,
        field: String,
        amount: i64,
    },
}

impl Op {
    /// The key this operation targets. Used by the engine facade to apply
    /// the namespace prefix.
    pub fn key_mut(&mut self) -> &mut String {
        match self {
            Op::Set { key, .. }
            | Op::Get { key }
            | Op::Delete { key }
            | Op::Incr { key, .. }
            | Op::Expire { key, .. }
            | Op::Zadd { key, .. }
            | Op::Zrem { key, .. }
            | Op::Zincrby { key, .. }
            | Op::Lpush { key, .. }
            | Op::Rpush { key, .. }
            | Op::Sadd { key, .. }
            | Op::Srem { key, .. }
            | Op::Hset { key, .. }
            | Op::Hdel { key, .. }
            | Op::Hincrby { key, .. } => key,
        }
    }
}

/// The result of one operation inside a transaction batch.
///
/// Shapes match the standalone operations: `Set`/`Hset` yield `None`,
/// deletions and expirations yield `Bool`, counters yield `Int`, score
/// updates yield `Float`, and `Get` yields `Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpResult {
    /// No meaningful return value
    None,
    /// A boolean outcome
    Bool(bool),
    /// An integer count or new counter value
    Int(i64),
    /// A new score
    Float(f64),
    /// A value read, `None` when absent
    Value(Option<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_range_negative_indices() {
        let items = vec!["a", "b", "c", "d", "e"];
        assert_eq!(slice_range(&items, 0, -1), items);
        assert_eq!(slice_range(&items, -3, -1), vec!["c", "d", "e"]);
        assert_eq!(slice_range(&items, 1, 3), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_slice_range_clamps() {
        let items = vec!["a", "b", "c"];
        assert_eq!(slice_range(&items, 0, 100), items);
        assert_eq!(slice_range(&items, -100, 1), vec!["a", "b"]);
        assert_eq!(slice_range(&items, 3, 1), Vec::<&str>::new());
        assert_eq!(slice_range(&items, 5, 9), Vec::<&str>::new());
    }

    #[test]
    fn test_slice_range_empty() {
        assert_eq!(slice_range::<&str>(&[], 0, -1), Vec::<&str>::new());
    }

    #[test]
    fn test_cmp_score_member_tie_break() {
        assert_eq!(cmp_score_member(1.0, "a", 2.0, "a"), Ordering::Less);
        assert_eq!(cmp_score_member(2.0, "a", 2.0, "b"), Ordering::Less);
        assert_eq!(cmp_score_member(2.0, "b", 2.0, "b"), Ordering::Equal);
        assert_eq!(cmp_score_member(2.0, "c", 2.0, "b"), Ordering::Greater);
    }

    #[test]
    fn test_score_bounds() {
        assert!(ScoreBound::NegInf.admits_as_min(f64::MIN));
        assert!(ScoreBound::PosInf.admits_as_max(f64::MAX));
        assert!(ScoreBound::Value(10.0).admits_as_min(10.0));
        assert!(!ScoreBound::Value(10.0).admits_as_min(9.9));
        assert!(ScoreBound::Value(10.0).admits_as_max(10.0));
        assert!(!ScoreBound::Value(10.0).admits_as_max(10.1));
    }

    #[test]
    fn test_op_key_access() {
        let mut op = Op::Zadd {
            key: "lb".into(),
            score: 1.0,
            member: "u1".into(),
        };
        op.key_mut().insert_str(0, "app:");
        assert!(matches!(op, Op::Zadd { key, .. } if key == "app:lb"));
    }
}
