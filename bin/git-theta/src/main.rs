//! git-theta porcelain: track checkpoints, install hooks, push objects.

mod cmd;

use argh::FromArgs;
use cmd::{install_hooks::InstallHooksArgs, push::PushArgs, track::TrackArgs};
use tracing::error;

/// Version control for model checkpoints.
#[derive(FromArgs, Debug)]
struct TopLevel {
    #[argh(subcommand)]
    cmd: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
    Track(TrackArgs),
    InstallHooks(InstallHooksArgs),
    Push(PushArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let TopLevel { cmd } = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let result = match cmd {
        Commands::Track(args) => cmd::track::track(args).await,
        Commands::InstallHooks(args) => cmd::install_hooks::install_hooks(args).await,
        Commands::Push(args) => cmd::push::push(args).await,
    };
    if let Err(err) = result {
        error!("{err:?}");
        eprintln!("git-theta: {err:#}");
        std::process::exit(1);
    }
}
