//! The command location cache backing `hash` and the `hashall` option.

use std::collections::HashMap;
use std::path::PathBuf;

/// Caches resolved command locations.
#[derive(Clone, Debug, Default)]
pub struct PathCache {
    entries: HashMap<String, PathBuf>,
}

impl PathCache {
    /// Looks up a cached location.
    pub fn get(&self, name: &str) -> Option<PathBuf> {
        self.entries.get(name).cloned()
    }

    /// Records a location.
    pub fn set(&mut self, name: &str, path: PathBuf) {
        self.entries.insert(name.to_owned(), path);
    }

    /// Forgets a single entry; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Forgets everything.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Returns whether the cache is empty.
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over cached entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.entries.iter()
    }
}
