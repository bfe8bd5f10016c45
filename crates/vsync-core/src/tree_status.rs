//! Snapshot of a replica: what it last committed and what is on disk now.

use crate::fs::FileSystem;
use crate::hash_tree::HashTree;
use crate::hasher::TreeError;
use crate::metadata::{MetadataError, ReplicaMetadata};
use crate::replica::Replica;
use crate::replica_id::ReplicaId;
use crate::tree_change::TreeChange;
use crate::version_vector::{CounterOverflow, VersionVector};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TreeStatusError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Cannot record local edits in {root}: {source}")]
    Exhausted {
        root: String,
        source: CounterOverflow,
    },
}

pub type Result<T> = std::result::Result<T, TreeStatusError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStatus {
    /// Label of the replica root, for messages
    pub root: String,
    pub id: ReplicaId,
    /// Vector stored at the last sync
    pub pre_vv: VersionVector,
    /// Tree stored at the last sync
    pub known_hashes: HashTree,
    /// Tree as scanned from disk now
    pub disk_hashes: HashTree,
    /// `pre_vv`, advanced at `id` when the disk differs from the stored tree
    pub post_vv: VersionVector,
    /// Stored record, used to skip redundant metadata writes
    pub stored: ReplicaMetadata,
}

impl TreeStatus {
    pub fn from_parts(
        root: impl Into<String>,
        stored: ReplicaMetadata,
        disk_hashes: HashTree,
    ) -> Result<Self> {
        let root = root.into();
        let post_vv = if disk_hashes == stored.file_hashes {
            stored.version_vector.clone()
        } else {
            stored
                .version_vector
                .advance(&stored.id)
                .map_err(|source| TreeStatusError::Exhausted {
                    root: root.clone(),
                    source,
                })?
        };
        Ok(Self {
            root,
            id: stored.id.clone(),
            pre_vv: stored.version_vector.clone(),
            known_hashes: stored.file_hashes.clone(),
            disk_hashes,
            post_vv,
            stored,
        })
    }

    /// Whether the tree was edited since the last sync.
    pub fn has_local_changes(&self) -> bool {
        self.disk_hashes != self.known_hashes
    }

    /// Edits made since the last sync.
    pub fn local_change(&self) -> TreeChange {
        TreeChange::between(&self.known_hashes, &self.disk_hashes)
    }
}

impl<F: FileSystem> Replica<F> {
    /// Read the stored metadata, then scan the tree. Never writes.
    pub async fn read_status(&self) -> Result<TreeStatus> {
        let stored = self.read_metadata().await?;
        let disk_hashes = self.hash_tree().await?;
        let status = TreeStatus::from_parts(self.label(), stored, disk_hashes)?;
        debug!(
            "Status of {} ({}): stored {}, current {}",
            status.id, status.root, status.pre_vv, status.post_vv
        );
        Ok(status)
    }
}
