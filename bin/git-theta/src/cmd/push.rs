//! `git-theta push <remote>`: push every object referenced at HEAD.
//!
//! The retriable companion to clean-time pushing: rebuilds the full oid
//! batch from the manifests of all theta-tracked files and hands it to the
//! store in one call.

use std::path::Path;

use anyhow::{Context, Result};
use argh::FromArgs;
use theta_filter::{
    pattern_matches, read_gitattributes, record_oids, theta_tracked_patterns, GitManifestSource,
    GitRepo, ManifestSource,
};
use theta_params::Oid;
use theta_store::{LfsObjectStore, ObjectStore};
use tracing::{debug, info};

/// Push the objects behind all tracked manifests at HEAD.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "push")]
pub struct PushArgs {
    /// remote to push objects to
    #[argh(positional, default = "String::from(\"origin\")")]
    pub remote: String,
}

pub async fn push(args: PushArgs) -> Result<()> {
    let repo = GitRepo::discover(Path::new(".")).await?;
    let store = LfsObjectStore::new(repo.root().to_path_buf());
    let source = GitManifestSource::new(repo.clone());

    let patterns = theta_tracked_patterns(&read_gitattributes(&repo.gitattributes_file())?);
    if patterns.is_empty() {
        info!("no theta-tracked patterns; nothing to push");
        return Ok(());
    }

    let mut oids: Vec<Oid> = Vec::new();
    for file in repo.ls_files().await? {
        if !patterns.iter().any(|p| pattern_matches(p, &file)) {
            continue;
        }
        let Some((_, manifest)) = source.head_manifest(&file).await? else {
            continue;
        };
        debug!(file = %file, parameters = manifest.len(), "collecting objects");
        for (_, entry) in manifest.iter() {
            oids.extend(record_oids(&store, &entry.lfs_metadata).await?);
        }
    }
    oids.sort_unstable();
    oids.dedup();

    if oids.is_empty() {
        info!("no objects to push");
        return Ok(());
    }
    info!(count = oids.len(), remote = %args.remote, "pushing objects");
    store
        .push(&oids, &args.remote)
        .await
        .with_context(|| format!("pushing {} objects to {}", oids.len(), args.remote))?;
    Ok(())
}
