//! Process-wide binding table from dotted names to unit sources.
//!
//! The table itself is a plain map; the loader is its sole authorized
//! mutator and only ever evicts names it bound itself, so unrelated host
//! state can never be destabilized by a reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name -> source-path bindings for currently loaded units.
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: BTreeMap<String, PathBuf>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `source`, superseding any prior binding of the same
    /// name. Returns the superseded source, if any.
    pub fn bind(&mut self, name: impl Into<String>, source: impl Into<PathBuf>) -> Option<PathBuf> {
        self.bindings.insert(name.into(), source.into())
    }

    /// Evict a binding. Returns the source it pointed at, if bound.
    pub fn unbind(&mut self, name: &str) -> Option<PathBuf> {
        self.bindings.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn source_of(&self, name: &str) -> Option<&Path> {
        self.bindings.get(name).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound names in deterministic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_supersedes_same_name() {
        let mut ns = Namespace::new();
        assert!(ns.bind("proj.a", "/proj/a.pv").is_none());
        let prior = ns.bind("proj.a", "/other/a.pv");
        assert_eq!(prior, Some(PathBuf::from("/proj/a.pv")));
        assert_eq!(ns.source_of("proj.a"), Some(Path::new("/other/a.pv")));
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_unbind() {
        let mut ns = Namespace::new();
        ns.bind("proj.a", "/proj/a.pv");
        assert_eq!(ns.unbind("proj.a"), Some(PathBuf::from("/proj/a.pv")));
        assert!(ns.unbind("proj.a").is_none());
        assert!(ns.is_empty());
    }
}
