//! CLI configuration loaded from environment variables.

use vsync_core::SyncConfig;

/// Environment variable overriding the metadata file name.
pub const META_FILE_VAR: &str = "VSYNC_META_FILE";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `VSYNC_META_FILE`: Metadata file name (default `.vector-sync`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let sync = match lookup(META_FILE_VAR) {
            Some(name) => SyncConfig::with_meta_file(name).map_err(|source| ConfigError::Invalid {
                var: META_FILE_VAR,
                source,
            })?,
            None => SyncConfig::default(),
        };
        Ok(Self { sync })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {var}: {source}")]
    Invalid {
        var: &'static str,
        source: vsync_core::ConfigError,
    },
}
