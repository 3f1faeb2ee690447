//! The clean pipeline: checkpoint bytes in, manifest out.

use futures::{stream, StreamExt, TryStreamExt};
use theta_checkpoints::HandlerRegistry;
use theta_config::Config;
use theta_lsh::LshIndex;
use theta_metadata::{
    Metadata, ParamMetadata, ParamName, TensorMetadata, ThetaMetadata, UpdateType,
};
use theta_params::{CommitHash, Oid, Tensor};
use theta_store::ObjectStore;
use theta_updates::{update_handler, UpdateAux};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{envelope, materialize_entry, FilterError, FilterResult, ManifestSource, DEFAULT_REMOTE};

/// What a clean produced: the manifest and the objects it created.
#[derive(Debug)]
pub struct CleanOutcome {
    pub manifest: Metadata,
    pub new_oids: Vec<Oid>,
}

/// Drives checkpoint decomposition.
///
/// Parameters are processed independently up to the configured concurrency;
/// any single failure aborts the whole clean, so a partial manifest is
/// never emitted.
pub struct CleanPipeline<'a> {
    config: &'a Config,
    registry: &'a HandlerRegistry,
    store: &'a dyn ObjectStore,
    source: &'a dyn ManifestSource,
}

impl std::fmt::Debug for CleanPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanPipeline").finish_non_exhaustive()
    }
}

impl<'a> CleanPipeline<'a> {
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

    /// Decompose `checkpoint_bytes` for the tracked file at `path`.
    pub async fn clean(&self, checkpoint_bytes: &[u8], path: &str) -> FilterResult<CleanOutcome> {
        let handler = self.registry.handler(&self.config.checkpoint_type)?;
        let tree = handler.read(checkpoint_bytes)?;
        info!(path, parameters = tree.len(), "cleaning checkpoint");

        let (head_commit, previous) = match self.source.head_manifest(path).await? {
            Some((commit, manifest)) => (Some(commit), manifest),
            None => (None, Metadata::new()),
        };
        let index = Mutex::new(LshIndex::new(
            self.config.lsh_signature_size,
            self.config.lsh_threshold,
            self.config.lsh_pool_size,
        ));

        let results: Vec<(ParamName, ParamMetadata, Vec<Oid>)> =
            stream::iter(tree.iter().map(|(name, tensor)| {
                self.clean_param(name, tensor, &previous, head_commit, &index, path)
            }))
            .buffer_unordered(self.config.resolved_concurrency())
            .try_collect()
            .await?;

        let mut manifest = Metadata::new();
        let mut new_oids = Vec::new();
        for (name, meta, oids) in results {
            manifest.insert(name, meta);
            new_oids.extend(oids);
        }
        new_oids.sort_unstable();
        new_oids.dedup();

        if !new_oids.is_empty() {
            self.store.push(&new_oids, DEFAULT_REMOTE).await?;
        }
        info!(
            path,
            new_objects = new_oids.len(),
            "clean finished"
        );
        Ok(CleanOutcome { manifest, new_oids })
    }

    async fn clean_param(
        &self,
        name: &ParamName,
        tensor: &Tensor,
        previous: &Metadata,
        head_commit: Option<CommitHash>,
        index: &Mutex<LshIndex>,
        path: &str,
    ) -> FilterResult<(ParamName, ParamMetadata, Vec<Oid>)> {
        let Some(prev_entry) = previous.get(name) else {
            debug!(name = %name, "first sight, storing dense");
            return self.write_full_value(name, tensor).await;
        };

        if tensor.content_hash() == prev_entry.tensor_metadata.hash {
            debug!(name = %name, "value unchanged, carrying entry forward");
            return Ok((name.clone(), prev_entry.clone(), Vec::new()));
        }

        let prev_tensor =
            materialize_entry(self.source, self.store, path, name, prev_entry).await?;

        // The index screens for a close previous value; the exact
        // tolerance comparison confirms before the entry is reused.
        let screened = {
            let mut index = index.lock().await;
            index.insert(prev_entry.tensor_metadata.hash, prev_tensor.clone());
            matches!(
                index.query(tensor),
                Some(found) if *found.oid == prev_entry.tensor_metadata.hash
            )
        };
        if screened
            && tensor.allclose(
                &prev_tensor,
                self.config.parameter_atol,
                self.config.parameter_rtol,
            )
        {
            debug!(name = %name, "value within tolerances, carrying entry forward");
            return Ok((name.clone(), prev_entry.clone(), Vec::new()));
        }

        let update_type = self.config.update_type;
        if update_type == UpdateType::Dense {
            debug!(name = %name, "value replaced, storing dense");
            return self.write_full_value(name, tensor).await;
        }

        // Incremental entries chain through the commit that recorded the
        // previous value.
        let last_commit = head_commit.ok_or_else(|| FilterError::MissingAnchor {
            name: name.to_string(),
        })?;
        let handler = update_handler(update_type);
        let record = handler
            .calculate_update(tensor, Some(&prev_tensor), &UpdateAux::default())
            .await?;
        record.validate_keys(update_type, handler.required_keys())?;
        // The identity hash covers the value the chain rebuilds, which for
        // lossy kinds is the round-tripped value rather than the input.
        let materialized = handler.apply_update(&record, Some(&prev_tensor)).await?;
        let (lfs_metadata, new_oids) = envelope::put_record(self.store, &record).await?;
        debug!(name = %name, update_type = %update_type, "stored incremental update");

        let meta = ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(&materialized),
            lfs_metadata,
            theta_metadata: ThetaMetadata {
                update_type,
                last_commit: Some(last_commit),
            },
        };
        Ok((name.clone(), meta, new_oids))
    }

    async fn write_full_value(
        &self,
        name: &ParamName,
        tensor: &Tensor,
    ) -> FilterResult<(ParamName, ParamMetadata, Vec<Oid>)> {
        let handler = update_handler(UpdateType::Dense);
        let record = handler
            .calculate_update(tensor, None, &UpdateAux::default())
            .await?;
        let (lfs_metadata, new_oids) = envelope::put_record(self.store, &record).await?;
        let meta = ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(tensor),
            lfs_metadata,
            theta_metadata: ThetaMetadata {
                update_type: UpdateType::Dense,
                last_commit: None,
            },
        };
        Ok((name.clone(), meta, new_oids))
    }
}
