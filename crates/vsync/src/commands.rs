//! The `init`, `sync` and `status` commands over on-disk replicas.
//!
//! Each command returns data; printing and exit codes are left to `main`.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use vsync_core::{
    MetadataError, Prompt, Replica, ReplicaId, ReplicaMetadata, SyncConfig, SyncEngine, SyncError,
    SyncOutcome, TreeStatus, TreeStatusError,
};

use crate::native_fs::NativeFs;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Refusing to sync {0} with itself")]
    SameReplica(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Status(#[from] TreeStatusError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Resolve `root` to an absolute path when it exists.
pub async fn resolve(root: &Path) -> PathBuf {
    tokio::fs::canonicalize(root)
        .await
        .unwrap_or_else(|_| root.to_path_buf())
}

/// Replica handle for a directory on disk.
pub fn open_replica(root: &Path, config: &SyncConfig) -> Replica<NativeFs> {
    Replica::new(
        NativeFs::new(root.to_path_buf()),
        root.display().to_string(),
        config.clone(),
    )
}

/// Initialize the replica at `root` with identity `id`.
pub async fn init(root: &Path, id: ReplicaId, config: &SyncConfig) -> Result<ReplicaMetadata> {
    let replica = open_replica(&resolve(root).await, config);
    Ok(replica.init(id).await?)
}

/// Stored and current state of the replica at `root`.
pub async fn status(root: &Path, config: &SyncConfig) -> Result<TreeStatus> {
    let replica = open_replica(&resolve(root).await, config);
    Ok(replica.read_status().await?)
}

/// Synchronize the replicas at `local` and `remote`.
pub async fn sync<P: Prompt>(
    local: &Path,
    remote: &Path,
    config: &SyncConfig,
    prompt: P,
) -> Result<SyncOutcome> {
    let (local, remote) = (resolve(local).await, resolve(remote).await);
    if local == remote {
        return Err(CommandError::SameReplica(local.display().to_string()));
    }
    debug!("Syncing {} with {}", local.display(), remote.display());

    let a = open_replica(&local, config);
    let b = open_replica(&remote, config);
    Ok(SyncEngine::new(prompt).sync(&a, &b).await?)
}

/// JSON-quoted form used in user-facing messages.
pub fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

/// Human-readable report for `vsync status`.
pub fn render_status(status: &TreeStatus) -> String {
    let mut out = format!(
        "Replica {} in {}\nVersion vector: {}",
        quoted(status.id.as_str()),
        quoted(&status.root),
        status.post_vv
    );
    if status.post_vv != status.pre_vv {
        out.push_str(&format!(" (last synced at {})", status.pre_vv));
    }

    let change = status.local_change();
    if change.is_empty() {
        out.push_str("\nNo local changes since the last sync.");
    } else {
        out.push_str(&format!("\nLocal changes since the last sync:\n{}", change));
    }
    out
}
