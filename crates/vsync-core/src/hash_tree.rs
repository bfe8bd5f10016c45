//! HashTree: content state of a tracked tree at one instant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashTreeError {
    #[error("Invalid path in hash tree: {0:?}")]
    InvalidPath(String),

    #[error("Invalid digest for {path:?}: {digest:?}")]
    InvalidDigest { path: String, digest: String },
}

/// Map from relative file path (`/`-separated, no leading `/`) to the hex
/// digest of the file's bytes.
///
/// Paths compare case-sensitively and are kept sorted, so two trees with the
/// same content serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct HashTree(BTreeMap<String, String>);

impl HashTree {
    /// The empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from entries produced by a scan; entries are trusted.
    pub(crate) fn from_scan(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }
}

/// A tracked path: non-empty, relative, no empty, `.` or `..` segments.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn is_valid_digest(digest: &str) -> bool {
    !digest.is_empty() && digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl TryFrom<BTreeMap<String, String>> for HashTree {
    type Error = HashTreeError;

    fn try_from(entries: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        for (path, digest) in &entries {
            if !is_valid_path(path) {
                return Err(HashTreeError::InvalidPath(path.clone()));
            }
            if !is_valid_digest(digest) {
                return Err(HashTreeError::InvalidDigest {
                    path: path.clone(),
                    digest: digest.clone(),
                });
            }
        }
        Ok(Self(entries))
    }
}

impl From<HashTree> for BTreeMap<String, String> {
    fn from(tree: HashTree) -> Self {
        tree.0
    }
}
