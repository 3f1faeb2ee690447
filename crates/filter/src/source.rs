//! Where manifests at past commits come from.

use async_trait::async_trait;
use theta_metadata::Metadata;
use theta_params::CommitHash;

use crate::{FilterResult, GitRepo};

/// Resolves tracked-file manifests at commits.
///
/// The pipelines walk delta chains through this trait; the production
/// implementation reads blobs out of git, tests use a static map.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// HEAD commit, or `None` before the first commit.
    async fn head_commit(&self) -> FilterResult<Option<CommitHash>>;

    /// Manifest recorded for `path` at `commit`, or `None` when the file
    /// did not exist there.
    async fn manifest_at(&self, commit: &CommitHash, path: &str)
        -> FilterResult<Option<Metadata>>;

    /// Manifest for `path` at HEAD, with the commit it came from.
    async fn head_manifest(&self, path: &str) -> FilterResult<Option<(CommitHash, Metadata)>> {
        let Some(head) = self.head_commit().await? else {
            return Ok(None);
        };
        Ok(self
            .manifest_at(&head, path)
            .await?
            .map(|manifest| (head, manifest)))
    }
}

/// Manifest source backed by git blobs.
#[derive(Clone, Debug)]
pub struct GitManifestSource {
    repo: GitRepo,
}

impl GitManifestSource {
    pub fn new(repo: GitRepo) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }
}

#[async_trait]
impl ManifestSource for GitManifestSource {
    async fn head_commit(&self) -> FilterResult<Option<CommitHash>> {
        self.repo.head_commit().await
    }

    async fn manifest_at(
        &self,
        commit: &CommitHash,
        path: &str,
    ) -> FilterResult<Option<Metadata>> {
        let revision = commit.to_string();
        match self.repo.file_at(&revision, path).await? {
            Some(bytes) => Ok(Some(Metadata::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Fixed manifest history for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticManifestSource {
    head: Option<CommitHash>,
    manifests: std::collections::BTreeMap<(CommitHash, String), Metadata>,
}

impl StaticManifestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&mut self, head: CommitHash) {
        self.head = Some(head);
    }

    pub fn insert(&mut self, commit: CommitHash, path: &str, manifest: Metadata) {
        self.manifests.insert((commit, path.to_owned()), manifest);
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn head_commit(&self) -> FilterResult<Option<CommitHash>> {
        Ok(self.head)
    }

    async fn manifest_at(
        &self,
        commit: &CommitHash,
        path: &str,
    ) -> FilterResult<Option<Metadata>> {
        Ok(self
            .manifests
            .get(&(*commit, path.to_owned()))
            .cloned())
    }
}
