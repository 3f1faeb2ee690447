//! The smudge pipeline: manifest bytes in, checkpoint bytes out.

use futures::{stream, StreamExt, TryStreamExt};
use theta_checkpoints::{HandlerRegistry, ParamTree};
use theta_config::Config;
use theta_metadata::Metadata;
use theta_store::ObjectStore;
use tracing::info;

use crate::{materialize_entry, FilterResult, ManifestSource};

/// Drives checkpoint reconstruction.
///
/// Every parameter's chain is walked and verified before any output is
/// produced; the checkpoint is encoded fully in memory so a failure never
/// leaves partial bytes behind.
pub struct SmudgePipeline<'a> {
    config: &'a Config,
    registry: &'a HandlerRegistry,
    store: &'a dyn ObjectStore,
    source: &'a dyn ManifestSource,
}

impl std::fmt::Debug for SmudgePipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmudgePipeline").finish_non_exhaustive()
    }
}

impl<'a> SmudgePipeline<'a> {
    pub fn new(
        config: &'a Config,
        registry: &'a HandlerRegistry,
        store: &'a dyn ObjectStore,
        source: &'a dyn ManifestSource,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            source,
        }
    }

    /// Reconstruct the checkpoint a manifest stands in for.
    pub async fn smudge(&self, manifest_bytes: &[u8], path: &str) -> FilterResult<Vec<u8>> {
        let handler = self.registry.handler(&self.config.checkpoint_type)?;
        let manifest = Metadata::from_bytes(manifest_bytes)?;
        info!(path, parameters = manifest.len(), "smudging manifest");

        let tree: ParamTree = stream::iter(manifest.iter().map(|(name, entry)| async move {
            let tensor = materialize_entry(self.source, self.store, path, name, entry).await?;
            FilterResult::Ok((name.clone(), tensor))
        }))
        .buffer_unordered(self.config.resolved_concurrency())
        .try_collect()
        .await?;

        Ok(handler.write(&tree)?)
    }
}
