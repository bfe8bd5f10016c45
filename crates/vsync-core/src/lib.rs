//! vsync-core: two-replica file tree synchronization driven by version vectors.
//!
//! This crate provides the core functionality for:
//! - Version vector algebra (`advance`, `leq`, `join`)
//! - Hashing a replica's file tree and detecting local edits since the last sync
//! - Reading and atomically persisting per-replica metadata
//! - Deciding which replica dominates, or refusing when they have diverged
//! - Diffing hash trees and applying the change to a destination replica
//! - FileSystem and Prompt trait abstractions so the engine is testable without I/O

pub mod config;
pub mod fs;
pub mod hash_tree;
pub mod hasher;
pub mod merge;
pub mod metadata;
pub mod prompt;
pub mod replica;
pub mod replica_id;
pub mod sync_engine;
pub mod tree_change;
pub mod tree_status;
pub mod version_vector;

pub use config::{ConfigError, SyncConfig, DEFAULT_META_FILE};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, InMemoryFs};
pub use hash_tree::{HashTree, HashTreeError};
pub use hasher::{hash_bytes, TreeError, TreeHasher};
pub use merge::{decide, Diverged, DivergenceKind, MergeInput, MergeResult, Side};
pub use metadata::{MetadataError, ReplicaMetadata};
pub use prompt::{AssumeYes, Prompt, ScriptedPrompt};
pub use replica::Replica;
pub use replica_id::{ReplicaId, ReplicaIdError};
pub use sync_engine::{SyncEngine, SyncError, SyncOutcome, SyncPhase};
pub use tree_change::TreeChange;
pub use tree_status::{TreeStatus, TreeStatusError};
pub use version_vector::{CounterOverflow, VersionVector};
