//! Glob matching with minimatch defaults: `*` never crosses a `/` and a
//! leading dot has to be matched literally.

use glob::{MatchOptions, Pattern};
use tracing::warn;

pub const MINIMATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Compiled list of globs; invalid entries are reported and skipped.
#[derive(Debug, Clone, Default)]
pub struct GlobList {
    patterns: Vec<Pattern>,
}

impl GlobList {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid glob \"{}\": {}", glob.as_ref(), e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MINIMATCH_OPTIONS))
    }
}

/// One-shot check used where the glob list is not reused.
pub fn matches_any<S: AsRef<str>>(globs: &[S], path: &str) -> bool {
    GlobList::new(globs).is_match(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_matches_any_depth() {
        let globs = GlobList::new(&["**/*.map"]);
        assert!(globs.is_match("index.js.map"));
        assert!(globs.is_match("dist/chart.umd.js.map"));
        assert!(!globs.is_match("dist/chart.umd.js"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let globs = GlobList::new(&["chart.js/*"]);
        assert!(globs.is_match("chart.js/auto"));
        assert!(!globs.is_match("chart.js/dist/helpers"));
    }

    #[test]
    fn test_invalid_glob_is_skipped() {
        let globs = GlobList::new(&["[", "*.css"]);
        assert!(globs.is_match("style.css"));
        assert!(!globs.is_empty());
    }
}
