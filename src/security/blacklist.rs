//! Cache bypass patterns.

use regex::RegexSet;

/// A configured pattern failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid blacklist pattern {pattern:?}: {source}")]
pub struct BlacklistError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Compiled set of path patterns whose requests never touch the cache.
#[derive(Debug, Clone)]
pub struct Blacklist {
    set: RegexSet,
}

impl Blacklist {
    /// Compile every pattern; the first malformed one is an error.
    pub fn compile<I, S>(patterns: I) -> Result<Self, BlacklistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();

        // Compile individually first so the error names the offending pattern.
        for pattern in &patterns {
            regex::Regex::new(pattern).map_err(|source| BlacklistError {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let set = RegexSet::new(&patterns).map_err(|source| BlacklistError {
            pattern: patterns.join(" | "),
            source,
        })?;
        Ok(Self { set })
    }

    /// True if any pattern matches `path`.
    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self {
            set: RegexSet::empty(),
        }
    }
}
