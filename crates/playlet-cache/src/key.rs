//! Structured cache keys.

use std::collections::BTreeMap;
use std::fmt;

/// Cache key: endpoint path plus ordered parameters.
///
/// Parameters are kept in a `BTreeMap` so two keys built with the same
/// parameters in different orders hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    path: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    /// Create a key for an endpoint path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The endpoint path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_ignores_param_order() {
        let a = QueryKey::new("series").with("genre", "romance").with("page", "2");
        let b = QueryKey::new("series").with("page", "2").with("genre", "romance");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_params() {
        let a = QueryKey::new("series").with("genre", "romance");
        let b = QueryKey::new("series").with("genre", "thriller");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let key = QueryKey::new("series").with("genre", "romance").with("page", "2");
        assert_eq!(key.to_string(), "series?genre=romance&page=2");

        let bare = QueryKey::new("watchlist");
        assert_eq!(bare.to_string(), "watchlist");
    }
}
