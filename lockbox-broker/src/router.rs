use crate::authz::path_within;
use crate::handlers::Handler;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("route prefix {0} is already registered")]
    DuplicatePrefix(String),
    #[error("route prefix {0} must be absolute and must not end with '/'")]
    InvalidPrefix(String),
}

/// One registered route: a path prefix and the handler bound to it.
pub struct RouteEntry {
    prefix: String,
    handler: Arc<dyn Handler>,
}

impl RouteEntry {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    /// Path components below this entry's prefix, without a leading slash.
    pub fn trail<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.prefix.as_str())
            .unwrap_or("")
            .trim_start_matches('/')
    }

    fn matches(&self, path: &str) -> bool {
        path_within(path, &self.prefix)
    }
}

/// Longest-prefix-match router over registered path prefixes.
///
/// Built once at startup and read-only afterwards; concurrent resolution
/// needs no synchronisation.
#[derive(Default)]
pub struct PathRouter {
    // Kept sorted by descending prefix length so the first match wins.
    entries: Vec<RouteEntry>,
}

impl PathRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, prefix: &str, handler: Arc<dyn Handler>) -> Result<(), RouterError> {
        if !prefix.starts_with('/') || (prefix != "/" && prefix.ends_with('/')) {
            return Err(RouterError::InvalidPrefix(prefix.to_string()));
        }
        if self.entries.iter().any(|entry| entry.prefix == prefix) {
            return Err(RouterError::DuplicatePrefix(prefix.to_string()));
        }
        let entry = RouteEntry {
            prefix: prefix.to_string(),
            handler,
        };
        let at = self
            .entries
            .partition_point(|existing| existing.prefix.len() >= entry.prefix.len());
        self.entries.insert(at, entry);
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
