//! Fractional Index: dense ordering keys
//!
//! A key is a base-62 fraction written as a string of digits `0-9A-Za-z`.
//! ASCII order of the digit alphabet equals numeric order, so plain string
//! comparison orders keys, and a new key can always be generated strictly
//! between any two existing ones without renumbering anything.
//!
//! Keys never end in the zero digit; that keeps string order and numeric
//! order identical.
//!
//! # Example
//!
//! ```
//! use synctext_core::crdt::FractionalIndex;
//!
//! let a = FractionalIndex::first();
//! let b = FractionalIndex::between(Some(&a), None);
//! let mid = FractionalIndex::between(Some(&a), Some(&b));
//!
//! assert!(a < mid && mid < b);
//! ```

use serde::{Deserialize, Serialize};

const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = 62;

/// Dense, totally ordered position key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FractionalIndex(String);

impl FractionalIndex {
    /// Key for the first element of an empty sequence
    pub fn first() -> Self {
        Self::between(None, None)
    }

    /// Generate a key strictly between `left` and `right`
    ///
    /// `None` stands for the open end of the sequence. The caller guarantees
    /// `left < right` when both are given.
    pub fn between(left: Option<&Self>, right: Option<&Self>) -> Self {
        let a = left.map(|k| k.digits()).unwrap_or_default();
        let b = right.map(|k| k.digits());
        let digits = midpoint(&a, b.as_deref());
        Self(digits.into_iter().map(|d| DIGITS[d] as char).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digits(&self) -> Vec<usize> {
        self.0
            .bytes()
            .map(|c| DIGITS.iter().position(|&d| d == c).unwrap_or(0))
            .collect()
    }
}

impl std::fmt::Display for FractionalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn midpoint(a: &[usize], b: Option<&[usize]>) -> Vec<usize> {
    if let Some(b) = b {
        // Shared prefix is copied verbatim
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(0) == b[n] {
            n += 1;
        }
        if n > 0 {
            let mut out = b[..n].to_vec();
            let rest = a.get(n..).unwrap_or(&[]);
            out.extend(midpoint(rest, Some(&b[n..])));
            return out;
        }
    }

    let da = a.first().copied().unwrap_or(0);
    let db = b.and_then(|b| b.first().copied()).unwrap_or(BASE);

    if db > da + 1 {
        vec![(da + db) / 2]
    } else if b.is_some_and(|b| b.len() > 1) {
        vec![db]
    } else {
        let mut out = vec![da];
        out.extend(midpoint(a.get(1..).unwrap_or(&[]), None));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_key() {
        let first = FractionalIndex::first();
        assert_eq!(first.as_str(), "V");
    }

    #[test]
    fn test_between_open_ends() {
        let first = FractionalIndex::first();
        let before = FractionalIndex::between(None, Some(&first));
        let after = FractionalIndex::between(Some(&first), None);

        assert!(before < first);
        assert!(first < after);
    }

    #[test]
    fn test_repeated_bisection_stays_ordered() {
        let left = FractionalIndex::first();
        let mut right = FractionalIndex::between(Some(&left), None);

        for _ in 0..200 {
            let mid = FractionalIndex::between(Some(&left), Some(&right));
            assert!(left < mid, "{} < {}", left, mid);
            assert!(mid < right, "{} < {}", mid, right);
            right = mid;
        }
    }

    #[test]
    fn test_appending_stays_ordered() {
        let mut keys = vec![FractionalIndex::first()];
        for _ in 0..100 {
            let next = FractionalIndex::between(keys.last(), None);
            keys.push(next);
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_adjacent_digits() {
        let a = FractionalIndex("A".to_string());
        let b = FractionalIndex("B".to_string());
        let mid = FractionalIndex::between(Some(&a), Some(&b));

        assert!(a < mid && mid < b);
        assert!(!mid.as_str().ends_with('0'));
    }

    #[test]
    fn test_serializes_as_string() {
        let key = FractionalIndex::first();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"V\"");
    }
}
