//! Replica: one side of a sync, a filesystem rooted at the replica directory.
//!
//! Behaviour is spread over the modules that own each concern:
//! `metadata` (read/write/init), `hasher` (tree scans) and `tree_status`.

use crate::config::SyncConfig;
use crate::fs::FileSystem;

/// A replica root plus the configuration needed to interpret it.
pub struct Replica<F: FileSystem> {
    /// Filesystem rooted at the replica directory
    fs: F,
    /// Human-readable location (usually the directory path), for messages only
    label: String,
    config: SyncConfig,
}

impl<F: FileSystem> Replica<F> {
    pub fn new(fs: F, label: impl Into<String>, config: SyncConfig) -> Self {
        Self {
            fs,
            label: label.into(),
            config,
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reserved metadata file name at this replica's root.
    pub fn meta_file(&self) -> &str {
        self.config.meta_file()
    }
}
