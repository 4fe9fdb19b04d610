//! Canonical query keys.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{InventoryError, Result};

/// Case-insensitive identity of a tabular query shape.
///
/// Equality and hashing use only the canonical form; the original text is
/// kept for diagnostics and for handing to the describer.
#[derive(Debug, Clone)]
pub struct QueryKey {
    canonical: String,
    original: String,
}

impl QueryKey {
    /// Canonicalize `query`: surrounding whitespace is dropped and case folded.
    pub fn new(query: &str) -> Result<Self> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(InventoryError::invalid_argument(
                "query",
                "query must not be empty",
            ));
        }
        Ok(Self {
            canonical: trimmed.to_lowercase(),
            original: trimmed.to_string(),
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn original(&self) -> &str {
        &self.original
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_identity() {
        let a = QueryKey::new("SELECT A").unwrap();
        let b = QueryKey::new("select a").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "select a");
        assert_eq!(a.original(), "SELECT A");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            QueryKey::new("  SELECT * FROM Property ").unwrap(),
            QueryKey::new("select * from property").unwrap()
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            QueryKey::new("").unwrap_err(),
            InventoryError::InvalidArgument { .. }
        ));
        assert!(QueryKey::new("   ").is_err());
    }
}
