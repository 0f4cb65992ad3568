//! Include/exclude glob pattern sets.
//!
//! Patterns are matched against the `/`-separated path relative to the
//! snapshot root. `*` does not cross directory separators, `**` does, and
//! a trailing `/` is shorthand for "everything below", so `build/`
//! excludes `build` and all of its descendants.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::element::FileTreeElement;
use crate::error::PatternError;

/// A compiled set of include and exclude patterns.
///
/// An empty set (no includes, no excludes) matches everything.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    includes: Vec<String>,
    excludes: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl PatternSet {
    /// A pattern set that matches everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile include and exclude patterns.
    pub fn new<I, E, S, T>(includes: I, excludes: E) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let includes: Vec<String> = includes.into_iter().map(Into::into).collect();
        let excludes: Vec<String> = excludes.into_iter().map(Into::into).collect();
        let include_set = compile(&includes)?;
        let exclude_set = compile(&excludes)?;
        Ok(Self {
            includes,
            excludes,
            include_set,
            exclude_set,
        })
    }

    /// Whether this set places no constraint at all.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Evaluate the set against a file tree element.
    pub fn is_satisfied_by(&self, element: &dyn FileTreeElement) -> bool {
        self.matches_relative(&element.relative_path().path_string())
    }

    /// Evaluate the set against a `/`-separated relative path.
    pub fn matches_relative(&self, relative: &str) -> bool {
        let included = self
            .include_set
            .as_ref()
            .is_none_or(|set| set.is_match(relative));
        let excluded = self
            .exclude_set
            .as_ref()
            .is_some_and(|set| set.is_match(relative));
        included && !excluded
    }
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>, PatternError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        for expanded in expand_pattern(pattern) {
            builder.add(glob(&expanded, pattern)?);
        }
    }
    builder
        .build()
        .map(Some)
        .map_err(|source| PatternError::Invalid {
            pattern: patterns.join(", "),
            source,
        })
}

fn glob(expanded: &str, original: &str) -> Result<Glob, PatternError> {
    GlobBuilder::new(expanded)
        .literal_separator(true)
        .build()
        .map_err(|source| PatternError::Invalid {
            pattern: original.to_string(),
            source,
        })
}

/// Apply the trailing-slash shorthand and let `dir/**` also match `dir`.
fn expand_pattern(pattern: &str) -> Vec<String> {
    let mut pattern = pattern.replace('\\', "/");
    if pattern.ends_with('/') {
        pattern.push_str("**");
    }
    match pattern.strip_suffix("/**") {
        Some(dir) if !dir.is_empty() => vec![dir.to_string(), pattern.clone()],
        _ => vec![pattern],
    }
}
