//! Collation handles.
//!
//! Collation engines live outside the VM; this is the interface the
//! comparison code calls through, plus two simple engines.

use std::cmp::Ordering;
use std::fmt;

/// A string comparison strategy.
pub trait Collator: fmt::Debug + Send + Sync {
    /// Compares two strings under this collation.
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// A key such that binary comparison of keys matches [`Collator::compare`].
    fn comparison_key(&self, s: &str) -> String;
}

/// Byte-order comparison. Equivalent to having no collator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCollator;

impl Collator for BinaryCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }

    fn comparison_key(&self, s: &str) -> String {
        s.to_string()
    }
}

/// Compares strings ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveCollator;

impl Collator for CaseInsensitiveCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase))
    }

    fn comparison_key(&self, s: &str) -> String {
        s.to_lowercase()
    }
}
