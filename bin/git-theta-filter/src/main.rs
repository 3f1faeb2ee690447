//! The git filter driver: clean on stage, smudge on checkout.
//!
//! Both directions speak the filter protocol: the working-tree file arrives
//! on stdin and the converted form leaves on stdout, so logging goes to a
//! file under the system temp directory instead of the console.

use std::path::Path;

use anyhow::{Context, Result};
use argh::FromArgs;
use theta_checkpoints::HandlerRegistry;
use theta_config::Config;
use theta_filter::{CleanPipeline, GitManifestSource, GitRepo, SmudgePipeline};
use theta_store::LfsObjectStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

/// Filter driver converting checkpoints to manifests and back.
#[derive(FromArgs, Debug)]
struct TopLevel {
    #[argh(subcommand)]
    cmd: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
    Clean(CleanArgs),
    Smudge(SmudgeArgs),
}

/// Decompose a checkpoint from stdin into a manifest on stdout.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "clean")]
struct CleanArgs {
    /// repository path of the file being cleaned
    #[argh(positional)]
    path: String,
}

/// Reconstruct a checkpoint on stdout from a manifest on stdin.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "smudge")]
struct SmudgeArgs {
    /// repository path of the file being smudged
    #[argh(positional)]
    path: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let TopLevel { cmd } = argh::from_env();

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

    let result = match cmd {
        Commands::Clean(args) => clean(args).await,
        Commands::Smudge(args) => smudge(args).await,
    };
    if let Err(err) = result {
        error!("filter failed: {err:?}");
        eprintln!("git-theta-filter: {err:#}");
        std::process::exit(1);
    }
}

struct Collaborators {
    config: Config,
    registry: HandlerRegistry,
    store: LfsObjectStore,
    source: GitManifestSource,
}

async fn collaborators() -> Result<Collaborators> {
    let config = Config::from_env().context("configuration")?;
    let repo = GitRepo::discover(Path::new(".")).await?;
    let store = LfsObjectStore::new(repo.root().to_path_buf());
    let source = GitManifestSource::new(repo);
    Ok(Collaborators {
        config,
        registry: HandlerRegistry::new(),
        store,
        source,
    })
}

async fn read_stdin() -> Result<Vec<u8>> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("reading stdin")?;
    Ok(input)
}

async fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await.context("writing stdout")?;
    stdout.flush().await.context("flushing stdout")?;
    Ok(())
}

async fn clean(args: CleanArgs) -> Result<()> {
    info!(path = %args.path, "clean filter invoked");
    let c = collaborators().await?;
    let input = read_stdin().await?;
    let outcome = CleanPipeline::new(&c.config, &c.registry, &c.store, &c.source)
        .clean(&input, &args.path)
        .await
        .with_context(|| format!("cleaning {}", args.path))?;
    write_stdout(&outcome.manifest.to_canonical_bytes()?).await
}

async fn smudge(args: SmudgeArgs) -> Result<()> {
    info!(path = %args.path, "smudge filter invoked");
    let c = collaborators().await?;
    let input = read_stdin().await?;
    let checkpoint = SmudgePipeline::new(&c.config, &c.registry, &c.store, &c.source)
        .smudge(&input, &args.path)
        .await
        .with_context(|| format!("smudging {}", args.path))?;
    write_stdout(&checkpoint).await
}
