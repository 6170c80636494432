//! Compiled glob patterns for deciding which paths a formatter acts on.
//!
//! Patterns use globset syntax and are matched against paths exactly as the
//! caller passes them, so every path handed to [`PatternSet::is_match`] must
//! share one normalization (forward slashes, relative to the tree root).
//!
//! ## Syntax
//!
//! - `*` and `?` match within the path as a whole (`*.go` matches `a.go` and `cmd/a.go`)
//! - `**` spans any number of path segments (`vendor/**`)
//! - `[abc]`, `{a,b}` character classes and alternations
//!
//! ## Usage
//!
//! ```
//! use batchfmt_core::matcher::{compile_patterns, path_matches};
//!
//! let set = compile_patterns(&["*.go", "cmd/**"]).unwrap();
//! assert!(path_matches("main.go", &set));
//! assert!(path_matches("cmd/tool/README", &set));
//! assert!(!path_matches("main.py", &set));
//! ```

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Error type for pattern compilation.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Invalid glob pattern syntax.
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// An immutable, ordered set of compiled glob patterns.
///
/// An empty set never matches. Sets are only produced by [`compile_patterns`],
/// [`PatternSet::empty`] and [`PatternSet::chain`]; none of them can be altered
/// once built.
#[derive(Clone)]
pub struct PatternSet {
    globs: Vec<Glob>,
    set: GlobSet,
}

impl PatternSet {
    /// A set with no patterns. Matches nothing.
    pub fn empty() -> Self {
        PatternSet {
            globs: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Returns true if at least one pattern matches `path`.
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        !self.globs.is_empty() && self.set.is_match(path.as_ref())
    }

    /// Concatenate `other` after this set's patterns.
    pub fn chain(&self, other: &PatternSet) -> Result<PatternSet, PatternError> {
        let globs: Vec<Glob> = self.globs.iter().chain(&other.globs).cloned().collect();
        from_globs(globs)
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.globs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    /// The source patterns, in compilation order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.globs.iter().map(Glob::glob)
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        PatternSet::empty()
    }
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.patterns()).finish()
    }
}

/// Compile pattern strings into a [`PatternSet`].
///
/// Fails on the first pattern that is not a valid glob. An empty input gives
/// an empty set.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<PatternSet, PatternError> {
    let mut globs = Vec::with_capacity(patterns.len());

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = Glob::new(pattern).map_err(|e| PatternError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.kind().to_string(),
        })?;
        globs.push(glob);
    }

    from_globs(globs)
}

/// Returns true if `path` matches any pattern in `patterns`.
pub fn path_matches(path: impl AsRef<Path>, patterns: &PatternSet) -> bool {
    patterns.is_match(path)
}

fn from_globs(globs: Vec<Glob>) -> Result<PatternSet, PatternError> {
    let mut builder = GlobSetBuilder::new();
    for glob in &globs {
        builder.add(glob.clone());
    }

    let set = builder.build().map_err(|e| PatternError::InvalidPattern {
        pattern: "<combined>".to_string(),
        message: e.to_string(),
    })?;

    Ok(PatternSet { globs, set })
}
