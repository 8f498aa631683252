//! Version identifiers
//!
//! A version identifier is a dot-separated tuple of decimal digit runs
//! (`1`, `1.4`, `2.10.0.7`). Anything else, including `v` prefixes and
//! pre-release suffixes, is not a version as far as the catalog is concerned.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

static VERSION_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)*$").expect("version grammar is a valid regex")
});

/// A validated version identifier
///
/// Ordering is numeric per component with missing components treated as
/// zero. Components are compared as digit strings, so arbitrarily long
/// components never overflow. Identifiers that are numerically equal
/// (`1.0` and `1.0.0`) fall back to byte order of the raw name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    raw: String,
}

impl VersionId {
    /// Parse a name, returning `None` if it does not match the grammar
    pub fn parse(name: &str) -> Option<Self> {
        if VERSION_GRAMMAR.is_match(name) {
            Some(Self {
                raw: name.to_string(),
            })
        } else {
            None
        }
    }

    /// Check whether a name matches the version grammar
    pub fn is_valid(name: &str) -> bool {
        VERSION_GRAMMAR.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compare numerically, ignoring the raw spelling
    pub fn numeric_cmp(&self, other: &Self) -> Ordering {
        let mut left = self.raw.split('.');
        let mut right = other.raw.split('.');

        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (l, r) => {
                    let ordering = compare_component(l.unwrap_or("0"), r.unwrap_or("0"));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
        }
    }
}

/// Compare two digit runs as unbounded non-negative integers
fn compare_component(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_cmp(other)
            .then_with(|| self.raw.as_bytes().cmp(other.raw.as_bytes()))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
