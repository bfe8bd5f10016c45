//! vsync library: native pieces around vsync-core.
//!
//! Exposes the native filesystem, terminal prompt, configuration and
//! command implementations so integration tests can drive them directly.

pub mod commands;
pub mod config;
pub mod native_fs;
pub mod terminal;

pub use commands::CommandError;
pub use config::{Config, ConfigError};
pub use native_fs::NativeFs;
pub use terminal::TerminalPrompt;
