//! Per-document version counters for whole-document sync.

use std::collections::HashMap;

/// Versions of the documents currently open on the server, keyed by URI.
///
/// A version is only meaningful within one open lifetime: closing a
/// document forgets it and reopening starts again at 1.
#[derive(Debug, Default)]
pub(crate) struct DocumentVersions {
    versions: HashMap<String, i32>,
}

impl DocumentVersions {
    /// Start tracking `uri` at version 1.
    pub fn open(&mut self, uri: &str) -> i32 {
        self.versions.insert(uri.to_string(), 1);
        1
    }

    /// Bump and return the version for `uri`. An untracked URI starts at 1.
    pub fn change(&mut self, uri: &str) -> i32 {
        match self.versions.get_mut(uri) {
            Some(version) => {
                *version += 1;
                *version
            }
            None => self.open(uri),
        }
    }

    pub fn close(&mut self, uri: &str) {
        self.versions.remove(uri);
    }

    pub fn version(&self, uri: &str) -> Option<i32> {
        self.versions.get(uri).copied()
    }

    pub fn clear(&mut self) {
        self.versions.clear();
    }
}
