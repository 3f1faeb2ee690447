//! Rebuilding tensor values from their update chains.

use std::{collections::HashMap, sync::Arc};

use theta_metadata::{Metadata, ParamMetadata, ParamName};
use theta_params::Tensor;
use theta_store::ObjectStore;
use theta_updates::update_handler;
use tracing::trace;

use crate::{envelope, FilterError, FilterResult, ManifestSource};

/// Materialize the value of one manifest entry.
///
/// Walks `last_commit` anchors back to the entry's dense materialization
/// point, then applies the chain forward. The rebuilt tensor is verified
/// against the entry's identity hash before it is returned.
pub async fn materialize_entry(
    source: &dyn ManifestSource,
    store: &dyn ObjectStore,
    path: &str,
    name: &ParamName,
    entry: &ParamMetadata,
) -> FilterResult<Tensor> {
    // Newest first; every element but the last is incremental.
    let mut chain = vec![entry.clone()];
    let mut seen_commits = Vec::new();
    let mut current = entry.clone();
    while current.theta_metadata.update_type.is_incremental() {
        let commit = current
            .theta_metadata
            .last_commit
            .ok_or_else(|| FilterError::MissingAnchor {
                name: name.to_string(),
            })?;
        // The chain is acyclic by construction; a repeated commit means a
        // corrupted manifest rather than a longer walk.
        if seen_commits.contains(&commit) {
            return Err(FilterError::MissingAnchor {
                name: name.to_string(),
            });
        }
        seen_commits.push(commit);
        let manifest = source
            .manifest_at(&commit, path)
            .await?
            .ok_or_else(|| FilterError::ManifestUnavailable {
                path: path.to_owned(),
                commit: commit.to_string(),
            })?;
        let previous = manifest
            .get(name)
            .ok_or_else(|| FilterError::MissingEntry {
                name: name.to_string(),
                commit: commit.to_string(),
            })?
            .clone();
        chain.push(previous.clone());
        current = previous;
    }
    trace!(name = %name, depth = chain.len(), "materializing update chain");

    let mut value: Option<Tensor> = None;
    for link in chain.iter().rev() {
        let record = envelope::get_record(store, &link.lfs_metadata).await?;
        let handler = update_handler(link.theta_metadata.update_type);
        value = Some(handler.apply_update(&record, value.as_ref()).await?);
    }
    let value = value.expect("chain has at least one link");

    let actual = value.content_hash();
    if actual != entry.tensor_metadata.hash {
        return Err(FilterError::Integrity {
            name: name.to_string(),
            expected: entry.tensor_metadata.hash,
            actual,
        });
    }
    Ok(value)
}

/// Memoizing fetcher of materialized values for one manifest.
///
/// Merge actions and the manual-merge writer pull tensors through this so
/// repeated lookups of the same parameter fetch objects once.
pub struct ParamCache<'a> {
    source: &'a dyn ManifestSource,
    store: &'a dyn ObjectStore,
    manifest: &'a Metadata,
    path: &'a str,
    cache: tokio::sync::Mutex<HashMap<ParamName, Arc<Tensor>>>,
}

impl std::fmt::Debug for ParamCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamCache").field("path", &self.path).finish()
    }
}

impl<'a> ParamCache<'a> {
    pub fn new(
        source: &'a dyn ManifestSource,
        store: &'a dyn ObjectStore,
        manifest: &'a Metadata,
        path: &'a str,
    ) -> Self {
        Self {
            source,
            store,
            manifest,
            path,
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn manifest(&self) -> &Metadata {
        self.manifest
    }

    /// Materialized value of `name` in this cache's manifest.
    pub async fn fetch(&self, name: &ParamName) -> FilterResult<Arc<Tensor>> {
        let mut cache = self.cache.lock().await;
        if let Some(tensor) = cache.get(name) {
            return Ok(Arc::clone(tensor));
        }
        let entry = self
            .manifest
            .get(name)
            .ok_or_else(|| FilterError::MissingEntry {
                name: name.to_string(),
                commit: "<manifest>".to_owned(),
            })?;
        let tensor = Arc::new(
            materialize_entry(self.source, self.store, self.path, name, entry).await?,
        );
        cache.insert(name.clone(), Arc::clone(&tensor));
        Ok(tensor)
    }
}
