//! Persistence for per-replica metadata.
//!
//! Stored as pretty-printed JSON in the reserved file at the replica root.
//! `init` creates the file exclusively; a sync replaces it through a
//! temporary file and a rename, so readers never see a half-written record.

use crate::config::staging_file_name;
use crate::fs::{FileSystem, FsError};
use crate::hash_tree::HashTree;
use crate::replica::Replica;
use crate::replica_id::ReplicaId;
use crate::version_vector::VersionVector;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("No replica metadata at {0} (run `vsync init <id>` there first)")]
    NotFound(String),

    #[error("Replica already initialized: {0} exists")]
    AlreadyExists(String),

    #[error("Malformed metadata in {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// A replica's identity, causal history and last committed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicaMetadata {
    pub id: ReplicaId,
    pub version_vector: VersionVector,
    pub file_hashes: HashTree,
}

impl ReplicaMetadata {
    /// Metadata of a freshly initialized replica.
    pub fn new(id: ReplicaId) -> Self {
        Self {
            id,
            version_vector: VersionVector::new(),
            file_hashes: HashTree::new(),
        }
    }

    /// Stable encoding: sorted keys, fixed field order, trailing newline.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(bytes: &[u8], location: &str) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MetadataError::Malformed {
            path: location.to_string(),
            reason: e.to_string(),
        })
    }
}

impl<F: FileSystem> Replica<F> {
    fn meta_location(&self) -> String {
        format!("{}/{}", self.label().trim_end_matches('/'), self.meta_file())
    }

    /// Read this replica's metadata file.
    pub async fn read_metadata(&self) -> Result<ReplicaMetadata> {
        let bytes = match self.fs().read(self.meta_file()).await {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(_)) => return Err(MetadataError::NotFound(self.label().to_string())),
            Err(e) => return Err(e.into()),
        };

        let metadata = ReplicaMetadata::decode(&bytes, &self.meta_location())?;
        if metadata.file_hashes.contains(self.meta_file()) {
            return Err(MetadataError::Malformed {
                path: self.meta_location(),
                reason: format!("file_hashes lists the reserved file {:?}", self.meta_file()),
            });
        }
        Ok(metadata)
    }

    /// Write this replica's metadata file.
    ///
    /// With `overwrite == false` the file must not exist yet (the `init`
    /// path). With `overwrite == true` the content is replaced atomically.
    pub async fn write_metadata(&self, metadata: &ReplicaMetadata, overwrite: bool) -> Result<()> {
        let bytes = metadata.encode()?;

        if !overwrite {
            return match self.fs().create_new(self.meta_file(), &bytes).await {
                Err(FsError::AlreadyExists(_)) => Err(MetadataError::AlreadyExists(self.meta_location())),
                other => other.map_err(Into::into),
            };
        }

        let staging = staging_file_name(self.meta_file());
        if let Err(e) = self.fs().write_synced(&staging, &bytes).await {
            self.discard_staging(&staging).await;
            return Err(e.into());
        }
        if let Err(e) = self.fs().rename(&staging, self.meta_file()).await {
            self.discard_staging(&staging).await;
            return Err(e.into());
        }
        debug!("Wrote metadata for {} to {}", metadata.id, self.label());
        Ok(())
    }

    async fn discard_staging(&self, staging: &str) {
        match self.fs().delete(staging).await {
            Ok(()) | Err(FsError::NotFound(_)) => {}
            Err(e) => warn!("Failed to remove temporary metadata file {}: {}", staging, e),
        }
    }

    /// Initialize a new replica with an empty vector and an empty tree.
    pub async fn init(&self, id: ReplicaId) -> Result<ReplicaMetadata> {
        let metadata = ReplicaMetadata::new(id);
        self.write_metadata(&metadata, false).await?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SyncConfig, DEFAULT_META_FILE};
    use crate::fs::InMemoryFs;
    use crate::hasher::hash_bytes;
    use std::collections::BTreeMap;

    fn replica() -> Replica<InMemoryFs> {
        Replica::new(InMemoryFs::new(), "/tmp/replica", SyncConfig::default())
    }

    fn id(s: &str) -> ReplicaId {
        s.parse().unwrap()
    }

    fn sample() -> ReplicaMetadata {
        let hashes: BTreeMap<String, String> = [
            ("school/homework".to_string(), hash_bytes(b"essay")),
            ("diary/november".to_string(), hash_bytes(b"Vector-Sync!")),
        ]
        .into_iter()
        .collect();
        ReplicaMetadata {
            id: id("Backup"),
            version_vector: [(id("Laptop"), 3), (id("Backup"), 2)].into(),
            file_hashes: HashTree::try_from(hashes).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let replica = replica();
        replica.write_metadata(&sample(), false).await.unwrap();

        assert_eq!(replica.read_metadata().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_read_missing() {
        let replica = replica();
        assert!(matches!(
            replica.read_metadata().await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_does_not_overwrite_by_default() {
        let replica = replica();
        let first = ReplicaMetadata::new(id("X"));
        replica.write_metadata(&first, false).await.unwrap();

        let result = replica.write_metadata(&sample(), false).await;

        assert!(matches!(result, Err(MetadataError::AlreadyExists(_))));
        assert_eq!(replica.read_metadata().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_leaves_no_staging_file() {
        let replica = replica();
        replica
            .write_metadata(&ReplicaMetadata::new(id("X")), false)
            .await
            .unwrap();

        replica.write_metadata(&sample(), true).await.unwrap();

        assert_eq!(replica.read_metadata().await.unwrap(), sample());
        let names: Vec<String> = replica
            .fs()
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![DEFAULT_META_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_creates_when_missing() {
        let replica = replica();
        replica.write_metadata(&sample(), true).await.unwrap();
        assert_eq!(replica.read_metadata().await.unwrap(), sample());
    }

    #[test]
    fn test_encoding_is_stable_and_sorted() {
        let encoded = String::from_utf8(sample().encode().unwrap()).unwrap();

        assert_eq!(encoded, String::from_utf8(sample().encode().unwrap()).unwrap());
        assert!(encoded.ends_with("}\n"));
        let id_pos = encoded.find("\"id\"").unwrap();
        let vv_pos = encoded.find("\"version_vector\"").unwrap();
        let fh_pos = encoded.find("\"file_hashes\"").unwrap();
        assert!(id_pos < vv_pos && vv_pos < fh_pos);
        assert!(encoded.find("\"Backup\": 2").unwrap() < encoded.find("\"Laptop\": 3").unwrap());
        assert!(encoded.find("diary/november").unwrap() < encoded.find("school/homework").unwrap());
    }

    #[tokio::test]
    async fn test_malformed_metadata() {
        let cases = [
            "not json",
            r#"{"id": "R", "version_vector": {"R": 1}}"#,
            r#"{"id": "R", "version_vector": {}, "file_hashes": {}, "extra": 1}"#,
            r#"{"id": "", "version_vector": {}, "file_hashes": {}}"#,
            r#"{"id": "R", "version_vector": {"R": "1"}, "file_hashes": {}}"#,
            r#"{"id": "R", "version_vector": {}, "file_hashes": {"a": 5}}"#,
            r#"{"id": "R", "version_vector": {}, "file_hashes": {".vector-sync": "00"}}"#,
        ];

        for raw in cases {
            let replica = replica();
            replica.fs().write(DEFAULT_META_FILE, raw.as_bytes()).await.unwrap();

            match replica.read_metadata().await {
                Err(MetadataError::Malformed { path, .. }) => {
                    assert_eq!(path, "/tmp/replica/.vector-sync")
                }
                other => panic!("Expected Malformed for {}, got {:?}", raw, other),
            }
        }
    }

    #[tokio::test]
    async fn test_init() {
        let replica = replica();

        let md = replica.init(id("Main Library")).await.unwrap();

        assert_eq!(md, ReplicaMetadata::new(id("Main Library")));
        assert_eq!(replica.read_metadata().await.unwrap(), md);
        assert!(matches!(
            replica.init(id("Other")).await,
            Err(MetadataError::AlreadyExists(_))
        ));
    }

    /// Delegates to an in-memory tree and records which paths were synced.
    #[derive(Default)]
    struct SyncTracking {
        inner: InMemoryFs,
        synced: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl FileSystem for SyncTracking {
        async fn open(&self, path: &str) -> crate::fs::Result<crate::fs::ByteStream> {
            self.inner.open(path).await
        }
        async fn read(&self, path: &str) -> crate::fs::Result<Vec<u8>> {
            self.inner.read(path).await
        }
        async fn write(&self, path: &str, content: &[u8]) -> crate::fs::Result<()> {
            self.inner.write(path, content).await
        }
        async fn write_synced(&self, path: &str, content: &[u8]) -> crate::fs::Result<()> {
            self.synced.lock().unwrap().push(path.to_string());
            self.inner.write(path, content).await
        }
        async fn write_from(
            &self,
            path: &str,
            reader: crate::fs::ByteStream,
        ) -> crate::fs::Result<u64> {
            self.inner.write_from(path, reader).await
        }
        async fn create_new(&self, path: &str, content: &[u8]) -> crate::fs::Result<()> {
            self.inner.create_new(path, content).await
        }
        async fn list(&self, path: &str) -> crate::fs::Result<Vec<crate::fs::FileEntry>> {
            self.inner.list(path).await
        }
        async fn delete(&self, path: &str) -> crate::fs::Result<()> {
            self.inner.delete(path).await
        }
        async fn stat(&self, path: &str) -> crate::fs::Result<crate::fs::FileStat> {
            self.inner.stat(path).await
        }
        async fn rename(&self, from: &str, to: &str) -> crate::fs::Result<()> {
            self.inner.rename(from, to).await
        }
    }

    #[tokio::test]
    async fn test_overwrite_syncs_staging_file_before_rename() {
        let replica = Replica::new(SyncTracking::default(), "/tmp/replica", SyncConfig::default());
        replica.init(id("X")).await.unwrap();

        replica.write_metadata(&sample(), true).await.unwrap();

        let synced = replica.fs().synced.lock().unwrap().clone();
        assert_eq!(synced.len(), 1);
        assert!(crate::config::is_staging_file(DEFAULT_META_FILE, &synced[0]));
        assert_eq!(replica.read_metadata().await.unwrap(), sample());
    }
}
