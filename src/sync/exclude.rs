//! Junk-file filtering for source listings.
//!
//! Operating systems and photo tools drop metadata files next to media;
//! they are never worth pulling.

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Patterns always skipped when listing a source.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // macOS
    ".DS_Store",
    "._*",
    // Windows
    "Thumbs.db",
    "desktop.ini",
    // Android media scanner
    ".nomedia",
    ".thumbnails",
    // Partial transfers
    "*.part",
    "*.tmp",
];

/// Compiled exclude patterns, matched against a file name and each
/// directory component of a source path.
#[derive(Debug, Clone)]
pub struct ExcludePatterns {
    glob_set: GlobSet,
}

impl ExcludePatterns {
    /// The built-in junk patterns.
    pub fn with_defaults() -> Self {
        Self::build(DEFAULT_EXCLUDES.iter().copied())
    }

    /// Built-in patterns plus user ones. Invalid user patterns are logged
    /// and dropped.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        Self::build(
            DEFAULT_EXCLUDES
                .iter()
                .copied()
                .chain(extra.iter().map(|s| s.as_ref())),
        )
    }

    fn build<'a>(patterns: impl Iterator<Item = &'a str>) -> Self {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern, error = %e, "ignoring invalid exclude pattern"),
            }
        }

        Self {
            glob_set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    /// Whether a `/`-separated source path should be skipped.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.glob_set.is_empty() {
            return false;
        }
        path.split('/')
            .filter(|part| !part.is_empty())
            .any(|part| self.glob_set.is_match(part))
    }
}
