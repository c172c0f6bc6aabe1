//! Path filters for export.

use std::fmt;
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};

use crate::Result;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Selects which entries are exported.
///
/// Paths are matched in their normalized form (`meshes/x/a.nif`), relative
/// to the archive that holds them.
#[derive(Clone)]
pub enum Filter {
    /// Case-insensitive glob; `*` crosses directory separators.
    Glob(Pattern),
    Regex(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Filter {
    pub fn glob(pattern: &str) -> Result<Self> {
        Ok(Self::Glob(Pattern::new(pattern)?))
    }

    /// Case-insensitive regex.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(RegexBuilder::new(pattern).case_insensitive(true).build()?))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Glob(pattern) => pattern.matches_with(path, GLOB_OPTIONS),
            Self::Regex(regex) => regex.is_match(path),
            Self::Predicate(f) => f(path),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob(pattern) => f.debug_tuple("Glob").field(&pattern.as_str()).finish(),
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
