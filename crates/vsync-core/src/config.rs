//! Engine configuration: the reserved metadata file name.

use thiserror::Error;

/// Name of the metadata file stored at the root of every replica.
pub const DEFAULT_META_FILE: &str = ".vector-sync";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Metadata file name must start with '.': {0:?}")]
    NotDotPrefixed(String),

    #[error("Metadata file name must be a single path component: {0:?}")]
    NotAComponent(String),
}

/// Settings threaded through every component that touches a replica root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    meta_file: String,
}

impl SyncConfig {
    /// Use a custom metadata file name (e.g. to isolate tests).
    ///
    /// The name must be dot-prefixed and a single path component.
    pub fn with_meta_file(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if !name.starts_with('.') {
            return Err(ConfigError::NotDotPrefixed(name));
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            return Err(ConfigError::NotAComponent(name));
        }
        Ok(Self { meta_file: name })
    }

    /// The reserved metadata file name.
    pub fn meta_file(&self) -> &str {
        &self.meta_file
    }
}

/// Name of a fresh staging file for an atomic replace of `meta_file`.
pub fn staging_file_name(meta_file: &str) -> String {
    format!("{}.{}.tmp", meta_file, uuid::Uuid::new_v4().simple())
}

/// Whether `name` is a staging file left behind for `meta_file`.
pub fn is_staging_file(meta_file: &str, name: &str) -> bool {
    name.strip_prefix(meta_file)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .is_some_and(|token| {
            token.len() == 32 && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            meta_file: DEFAULT_META_FILE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_meta_file() {
        assert_eq!(SyncConfig::default().meta_file(), ".vector-sync");
    }

    #[test]
    fn test_custom_meta_file() {
        let config = SyncConfig::with_meta_file(".vsync-test").unwrap();
        assert_eq!(config.meta_file(), ".vsync-test");
    }

    #[test]
    fn test_rejects_invalid_names() {
        assert_eq!(
            SyncConfig::with_meta_file("meta"),
            Err(ConfigError::NotDotPrefixed("meta".into()))
        );
        assert!(SyncConfig::with_meta_file("").is_err());
        assert!(SyncConfig::with_meta_file(".").is_err());
        assert!(SyncConfig::with_meta_file("..").is_err());
        assert!(SyncConfig::with_meta_file(".a/b").is_err());
    }

    #[test]
    fn test_staging_file_names() {
        let staged = staging_file_name(DEFAULT_META_FILE);

        assert!(is_staging_file(DEFAULT_META_FILE, &staged));
        assert_ne!(staged, staging_file_name(DEFAULT_META_FILE));
        assert!(!is_staging_file(".other", &staged));
        assert!(!is_staging_file(DEFAULT_META_FILE, DEFAULT_META_FILE));
        assert!(!is_staging_file(DEFAULT_META_FILE, ".vector-sync.notes.tmp"));
        assert!(!is_staging_file(
            DEFAULT_META_FILE,
            ".vector-sync.0123456789ABCDEF0123456789abcdef.tmp"
        ));
    }
}
