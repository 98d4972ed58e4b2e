//! Image URL rewriting towards a local cache.

use serde::{Deserialize, Serialize};

/// Replaces a source URL prefix with a cache prefix.
///
/// Only an exact prefix match is rewritten; any other URL is returned as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCacheRewrite {
    prefixes: Option<(String, String)>,
}

impl ImageCacheRewrite {
    /// A rewrite that never changes a URL.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Rewrites URLs starting with `source` to start with `target` instead.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        if source.is_empty() {
            return Self::disabled();
        }
        Self {
            prefixes: Some((source, target.into())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prefixes.is_some()
    }

    pub fn apply(&self, url: &str) -> String {
        match &self.prefixes {
            Some((source, target)) => match url.strip_prefix(source.as_str()) {
                Some(rest) => format!("{target}{rest}"),
                None => url.to_owned(),
            },
            None => url.to_owned(),
        }
    }
}
