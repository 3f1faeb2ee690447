//! The git merge driver: interactive three-way checkpoint merging.
//!
//! git invokes this with `ancestor current other path`. On success the
//! merged manifest replaces `current` and the process exits zero; quitting
//! or manual-merge mode exits one and leaves the merge state alone.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use theta_checkpoints::HandlerRegistry;
use theta_config::Config;
use theta_filter::{GitManifestSource, GitRepo};
use theta_merge::{DialoguerPrompter, MergeDriver, MergeError};
use theta_store::LfsObjectStore;
use tracing::{error, info};

/// Resolve a three-way manifest merge.
#[derive(FromArgs, Debug)]
struct Args {
    /// manifest of the common ancestor (%O)
    #[argh(positional)]
    ancestor: PathBuf,

    /// manifest of our branch, overwritten with the result (%A)
    #[argh(positional)]
    current: PathBuf,

    /// manifest of their branch (%B)
    #[argh(positional)]
    other: PathBuf,

    /// repository path of the checkpoint being merged (%P)
    #[argh(positional)]
    path: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Args = argh::from_env();

    let appender = tracing_appender::rolling::never(std::env::temp_dir(), "git-theta.log");
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    match run(args).await {
        Ok(()) => {}
        Err(err) => {
            if let Some(MergeError::UserAbort) = err.downcast_ref::<MergeError>() {
                info!("merge aborted by user");
            } else {
                error!("merge failed: {err:?}");
                eprintln!("git-theta-merge: {err:#}");
            }
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_env().context("configuration")?;
    let registry = HandlerRegistry::new();
    let repo = GitRepo::discover(Path::new(".")).await?;
    let store = LfsObjectStore::new(repo.root().to_path_buf());
    let source = GitManifestSource::new(repo);
    let driver = MergeDriver::new(&config, &registry, &store, &source);

    if config.manual_merge {
        driver
            .manual_merge(&args.ancestor, &args.current, &args.other, &args.path)
            .await?;
        // Non-zero tells git the merge is not resolved yet.
        anyhow::bail!("manual merge requested; combine the side checkpoints to finish");
    }

    let mut prompter = DialoguerPrompter::new();
    driver
        .merge(
            &args.ancestor,
            &args.current,
            &args.other,
            &args.path,
            &mut prompter,
        )
        .await?;
    Ok(())
}
