//! SyncEngine: brings two replicas to a common state.
//!
//! A sync runs through these phases:
//!
//! 1. Scanning: read both replicas' status concurrently (read-only)
//! 2. Deciding: pick the merged vector and tree, or stop on divergence
//! 3. Confirming: ask about the change to A, then B. Nothing has been
//!    touched yet, so declining either one leaves both replicas as they were
//! 4. Applying: copy content from the winning replica onto A, then B
//! 5. Committing: write the merged metadata where it differs from what is stored
//!
//! If both trees already match the merged tree and both metadata records are
//! current, the sync stops after deciding and writes nothing.

use crate::fs::{FileSystem, FsError};
use crate::merge::{decide, Diverged, MergeInput, MergeResult, Side};
use crate::metadata::{MetadataError, ReplicaMetadata};
use crate::prompt::Prompt;
use crate::replica::Replica;
use crate::replica_id::ReplicaId;
use crate::tree_change::{confirm_change, TreeChange};
use crate::tree_status::{TreeStatus, TreeStatusError};
use crate::version_vector::VersionVector;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Status(#[from] TreeStatusError),

    #[error(transparent)]
    Diverged(#[from] Diverged),

    #[error("Failed to update files in {replica}: {source}")]
    Apply { replica: String, source: FsError },

    #[error("Failed to commit metadata in {replica}: {source}")]
    Commit {
        replica: String,
        source: MetadataError,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Where a sync currently is. Every transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Scanning,
    Deciding,
    Confirming(Side),
    Applying(Side),
    Committing,
    Done,
    Canceled,
    Diverged,
    Failed,
}

/// How a sync ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Both replicas were already identical and current; nothing was written
    AlreadySynchronized,
    /// Both replicas now hold `version_vector` and the same tree
    Synchronized {
        version_vector: VersionVector,
        /// Change applied to each replica, A first
        changes: Vec<(ReplicaId, TreeChange)>,
    },
    /// The change to `replica` was declined; nothing was written
    Canceled { replica: ReplicaId },
}

/// Runs syncs, asking `prompt` before any replica is changed.
pub struct SyncEngine<P: Prompt> {
    prompt: P,
}

struct Phase(SyncPhase);

impl Phase {
    fn enter(&mut self, next: SyncPhase) {
        debug!("Sync phase {:?} -> {:?}", self.0, next);
        self.0 = next;
    }
}

impl<P: Prompt> SyncEngine<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Synchronize replicas `a` and `b`.
    ///
    /// Divergence and I/O failures are errors; a declined confirmation is the
    /// [`SyncOutcome::Canceled`] outcome.
    pub async fn sync<A, B>(&self, a: &Replica<A>, b: &Replica<B>) -> Result<SyncOutcome>
    where
        A: FileSystem,
        B: FileSystem,
    {
        let mut phase = Phase(SyncPhase::Scanning);
        debug!("Sync phase {:?}", phase.0);

        let result = self.run(a, b, &mut phase).await;
        match &result {
            Ok(SyncOutcome::Canceled { .. }) => phase.enter(SyncPhase::Canceled),
            Ok(_) => phase.enter(SyncPhase::Done),
            Err(SyncError::Diverged(_)) => phase.enter(SyncPhase::Diverged),
            Err(_) => phase.enter(SyncPhase::Failed),
        }
        result
    }

    async fn run<A, B>(&self, a: &Replica<A>, b: &Replica<B>, phase: &mut Phase) -> Result<SyncOutcome>
    where
        A: FileSystem,
        B: FileSystem,
    {
        let (status_a, status_b) = futures::try_join!(a.read_status(), b.read_status())?;
        if status_a.id == status_b.id {
            warn!(
                "Both replicas are named {:?} ({} and {}); their edits cannot be told apart",
                status_a.id.as_str(),
                status_a.root,
                status_b.root
            );
        }

        phase.enter(SyncPhase::Deciding);
        let merged = decide(merge_input(&status_a), merge_input(&status_b))?;
        debug!(
            "Merged vector {} from {} ({})",
            merged.version_vector,
            merged.winner,
            match merged.winner {
                Side::A => &status_a.root,
                Side::B => &status_b.root,
            }
        );

        let change_a = TreeChange::between(&status_a.disk_hashes, &merged.file_hashes);
        let change_b = TreeChange::between(&status_b.disk_hashes, &merged.file_hashes);
        let record_a = committed(&status_a, &merged);
        let record_b = committed(&status_b, &merged);

        if change_a.is_empty()
            && change_b.is_empty()
            && status_a.stored == record_a
            && status_b.stored == record_b
        {
            info!("{} and {} are already synchronized", status_a.root, status_b.root);
            return Ok(SyncOutcome::AlreadySynchronized);
        }

        phase.enter(SyncPhase::Confirming(Side::A));
        if !confirm_change(&change_a, &status_a.id, &self.prompt).await {
            info!("Sync canceled: change to {} declined", status_a.id);
            return Ok(SyncOutcome::Canceled {
                replica: status_a.id.clone(),
            });
        }
        phase.enter(SyncPhase::Confirming(Side::B));
        if !confirm_change(&change_b, &status_b.id, &self.prompt).await {
            info!("Sync canceled: change to {} declined", status_b.id);
            return Ok(SyncOutcome::Canceled {
                replica: status_b.id.clone(),
            });
        }

        let winner_fs: &dyn FileSystem = match merged.winner {
            Side::A => a.fs(),
            Side::B => b.fs(),
        };

        phase.enter(SyncPhase::Applying(Side::A));
        change_a
            .apply(winner_fs, a.fs())
            .await
            .map_err(|source| SyncError::Apply {
                replica: status_a.root.clone(),
                source,
            })?;
        phase.enter(SyncPhase::Applying(Side::B));
        change_b
            .apply(winner_fs, b.fs())
            .await
            .map_err(|source| SyncError::Apply {
                replica: status_b.root.clone(),
                source,
            })?;

        phase.enter(SyncPhase::Committing);
        commit(a, &status_a, &record_a).await?;
        commit(b, &status_b, &record_b).await?;

        info!(
            "Synchronized {} and {} at {}",
            status_a.root, status_b.root, merged.version_vector
        );
        Ok(SyncOutcome::Synchronized {
            version_vector: merged.version_vector,
            changes: vec![(status_a.id, change_a), (status_b.id, change_b)],
        })
    }
}

fn merge_input(status: &TreeStatus) -> MergeInput<'_> {
    MergeInput {
        id: &status.id,
        version_vector: &status.post_vv,
        file_hashes: &status.disk_hashes,
    }
}

/// Metadata a replica holds once the merged state is committed.
fn committed(status: &TreeStatus, merged: &MergeResult) -> ReplicaMetadata {
    ReplicaMetadata {
        id: status.id.clone(),
        version_vector: merged.version_vector.clone(),
        file_hashes: merged.file_hashes.clone(),
    }
}

async fn commit<F: FileSystem>(
    replica: &Replica<F>,
    status: &TreeStatus,
    record: &ReplicaMetadata,
) -> Result<()> {
    if status.stored == *record {
        debug!("Metadata of {} is current", status.root);
        return Ok(());
    }
    replica
        .write_metadata(record, true)
        .await
        .map_err(|source| SyncError::Commit {
            replica: status.root.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::fs::InMemoryFs;
    use crate::hasher::hash_bytes;
    use crate::merge::DivergenceKind;
    use crate::prompt::{AssumeYes, ScriptedPrompt};

    fn id(s: &str) -> ReplicaId {
        s.parse().unwrap()
    }

    async fn replica(name: &str, files: &[(&str, &str)]) -> Replica<InMemoryFs> {
        let fs = InMemoryFs::new();
        for (path, content) in files {
            fs.write(path, content.as_bytes()).await.unwrap();
        }
        let replica = Replica::new(fs, format!("/{}", name), SyncConfig::default());
        replica.init(id(name)).await.unwrap();
        replica
    }

    /// Store the current disk tree as committed, with vector `vv`.
    async fn record(replica: &Replica<InMemoryFs>, vv: VersionVector) {
        let mut md = replica.read_metadata().await.unwrap();
        md.version_vector = vv;
        md.file_hashes = replica.hash_tree().await.unwrap();
        replica.write_metadata(&md, true).await.unwrap();
    }

    async fn raw_metadata(replica: &Replica<InMemoryFs>) -> Vec<u8> {
        replica.fs().read(replica.meta_file()).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_replicas_are_already_synchronized() {
        let p = replica("P", &[]).await;
        let q = replica("Q", &[]).await;
        let (before_p, before_q) = (raw_metadata(&p).await, raw_metadata(&q).await);
        let engine = SyncEngine::new(ScriptedPrompt::default());

        let outcome = engine.sync(&p, &q).await.unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadySynchronized);
        assert!(engine.prompt().asked().is_empty());
        assert_eq!(raw_metadata(&p).await, before_p);
        assert_eq!(raw_metadata(&q).await, before_q);
        assert!(p.read_metadata().await.unwrap().version_vector.is_empty());
        assert!(q.read_metadata().await.unwrap().file_hashes.is_empty());
    }

    #[tokio::test]
    async fn test_dominating_edit_propagates() {
        let p = replica("P", &[("a", "1")]).await;
        let q = replica("Q", &[("a", "1")]).await;
        record(&p, VersionVector::new()).await;
        record(&q, VersionVector::new()).await;
        p.fs().write("a", b"2").await.unwrap();

        assert_eq!(p.read_status().await.unwrap().post_vv, [(id("P"), 1)].into());
        assert!(q.read_status().await.unwrap().post_vv.is_empty());

        let engine = SyncEngine::new(ScriptedPrompt::new(["y"]));
        let outcome = engine.sync(&p, &q).await.unwrap();

        let expected_vv: VersionVector = [(id("P"), 1)].into();
        match outcome {
            SyncOutcome::Synchronized {
                version_vector,
                changes,
            } => {
                assert_eq!(version_vector, expected_vv);
                assert!(changes[0].1.is_empty());
                assert_eq!(changes[1].0, id("Q"));
                assert_eq!(changes[1].1.overwrite.iter().collect::<Vec<_>>(), vec!["a"]);
            }
            other => panic!("Expected Synchronized, got {:?}", other),
        }
        // Only Q had a non-empty change to confirm
        assert_eq!(engine.prompt().asked(), vec!["Change \"Q\"?"]);
        assert_eq!(q.fs().read("a").await.unwrap(), b"2");
        for r in [&p, &q] {
            let md = r.read_metadata().await.unwrap();
            assert_eq!(md.version_vector, expected_vv);
            assert_eq!(md.file_hashes.get("a"), Some(hash_bytes(b"2").as_str()));
        }
        assert_eq!(p.read_metadata().await.unwrap().id, id("P"));
        assert_eq!(q.read_metadata().await.unwrap().id, id("Q"));

        // A second run has nothing left to do
        let again = SyncEngine::new(ScriptedPrompt::default());
        assert_eq!(again.sync(&p, &q).await.unwrap(), SyncOutcome::AlreadySynchronized);
    }

    #[tokio::test]
    async fn test_concurrent_edits_diverge_without_writes() {
        let p = replica("P", &[("a", "0")]).await;
        let q = replica("Q", &[("a", "0")]).await;
        record(&p, VersionVector::new()).await;
        record(&q, VersionVector::new()).await;
        p.fs().write("a", b"x").await.unwrap();
        q.fs().write("a", b"y").await.unwrap();
        let (before_p, before_q) = (raw_metadata(&p).await, raw_metadata(&q).await);

        let engine = SyncEngine::new(AssumeYes);
        match engine.sync(&p, &q).await {
            Err(SyncError::Diverged(d)) => {
                assert_eq!((d.a, d.b), (id("P"), id("Q")));
                assert_eq!(d.kind, DivergenceKind::Concurrent);
            }
            other => panic!("Expected Diverged, got {:?}", other),
        }

        assert_eq!(p.fs().read("a").await.unwrap(), b"x");
        assert_eq!(q.fs().read("a").await.unwrap(), b"y");
        assert_eq!(raw_metadata(&p).await, before_p);
        assert_eq!(raw_metadata(&q).await, before_q);
    }

    #[tokio::test]
    async fn test_equal_vectors_with_different_content_diverge() {
        let p = replica("P", &[("a", "x")]).await;
        let q = replica("Q", &[("a", "y")]).await;
        let vv: VersionVector = [(id("P"), 1)].into();
        record(&p, vv.clone()).await;
        record(&q, vv).await;

        match SyncEngine::new(AssumeYes).sync(&p, &q).await {
            Err(SyncError::Diverged(d)) => assert_eq!(d.kind, DivergenceKind::ConflictingContent),
            other => panic!("Expected Diverged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_declined_change_leaves_both_replicas_untouched() {
        let p = replica("P", &[("a", "1")]).await;
        let q = replica("Q", &[("a", "1")]).await;
        record(&p, VersionVector::new()).await;
        record(&q, VersionVector::new()).await;
        p.fs().write("a", b"2").await.unwrap();
        p.fs().write("new", b"n").await.unwrap();
        let (before_p, before_q) = (raw_metadata(&p).await, raw_metadata(&q).await);

        let engine = SyncEngine::new(ScriptedPrompt::new(["n"]));
        let outcome = engine.sync(&p, &q).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Canceled { replica: id("Q") });
        assert_eq!(q.fs().read("a").await.unwrap(), b"1");
        assert!(matches!(q.fs().stat("new").await, Err(FsError::NotFound(_))));
        assert_eq!(raw_metadata(&p).await, before_p);
        assert_eq!(raw_metadata(&q).await, before_q);
    }

    #[tokio::test]
    async fn test_declining_first_replica_skips_second_prompt() {
        let p = replica("P", &[]).await;
        let q = replica("Q", &[]).await;
        q.fs().write("extra", b"e").await.unwrap();

        let engine = SyncEngine::new(ScriptedPrompt::new(["n", "y"]));
        let outcome = engine.sync(&p, &q).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Canceled { replica: id("P") });
        assert_eq!(engine.prompt().asked(), vec!["Change \"P\"?"]);
        assert!(matches!(p.fs().stat("extra").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_identical_content_joins_vectors_and_commits() {
        let p = replica("P", &[("a", "same")]).await;
        let q = replica("Q", &[("a", "same")]).await;
        record(&p, [(id("P"), 2)].into()).await;
        record(&q, [(id("Q"), 3)].into()).await;

        let engine = SyncEngine::new(ScriptedPrompt::default());
        let outcome = engine.sync(&p, &q).await.unwrap();

        let joined: VersionVector = [(id("P"), 2), (id("Q"), 3)].into();
        match outcome {
            SyncOutcome::Synchronized {
                version_vector,
                changes,
            } => {
                assert_eq!(version_vector, joined);
                assert!(changes.iter().all(|(_, c)| c.is_empty()));
            }
            other => panic!("Expected Synchronized, got {:?}", other),
        }
        // No content change, so nobody is asked
        assert!(engine.prompt().asked().is_empty());
        assert_eq!(p.read_metadata().await.unwrap().version_vector, joined);
        assert_eq!(q.read_metadata().await.unwrap().version_vector, joined);
    }

    #[tokio::test]
    async fn test_only_stale_metadata_is_rewritten() {
        let p = replica("P", &[("a", "1")]).await;
        let q = replica("Q", &[]).await;
        record(&p, [(id("P"), 1)].into()).await;
        let before_p = raw_metadata(&p).await;

        let outcome = SyncEngine::new(AssumeYes).sync(&p, &q).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Synchronized { .. }));
        // P already held the merged record
        assert_eq!(raw_metadata(&p).await, before_p);
        assert_eq!(q.read_metadata().await.unwrap().version_vector, [(id("P"), 1)].into());
        assert_eq!(q.fs().read("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_file_and_directory_switch_across_replicas() {
        let p = replica("P", &[("x", "file")]).await;
        let q = replica("Q", &[("x", "file")]).await;
        record(&p, VersionVector::new()).await;
        record(&q, VersionVector::new()).await;
        q.fs().delete("x").await.unwrap();
        q.fs().write("x/inside", b"dir now").await.unwrap();

        SyncEngine::new(AssumeYes).sync(&p, &q).await.unwrap();

        assert_eq!(p.fs().read("x/inside").await.unwrap(), b"dir now");
        assert_eq!(p.hash_tree().await.unwrap(), q.hash_tree().await.unwrap());
    }

    #[tokio::test]
    async fn test_uninitialized_replica_fails() {
        let p = replica("P", &[]).await;
        let q = Replica::new(InMemoryFs::new(), "/Q", SyncConfig::default());

        assert!(matches!(
            SyncEngine::new(AssumeYes).sync(&p, &q).await,
            Err(SyncError::Status(TreeStatusError::Metadata(MetadataError::NotFound(_))))
        ));
    }

    #[tokio::test]
    async fn test_exhausted_counter_stops_before_any_write() {
        let p = replica("P", &[("a", "1")]).await;
        let q = replica("Q", &[]).await;
        record(&p, [(id("P"), u64::MAX)].into()).await;
        p.fs().write("a", b"edited").await.unwrap();
        let (before_p, before_q) = (raw_metadata(&p).await, raw_metadata(&q).await);

        let result = SyncEngine::new(AssumeYes).sync(&p, &q).await;

        assert!(matches!(
            result,
            Err(SyncError::Status(TreeStatusError::Exhausted { .. }))
        ));
        assert_eq!(raw_metadata(&p).await, before_p);
        assert_eq!(raw_metadata(&q).await, before_q);
        assert!(q.fs().read("a").await.is_err());
    }
}
