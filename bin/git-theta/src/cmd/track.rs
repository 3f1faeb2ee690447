//! `git-theta track <path>`: route a checkpoint through the theta drivers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use theta_filter::{
    add_theta_to_gitattributes, read_gitattributes, write_gitattributes, GitRepo,
};
use tracing::info;

/// Track a checkpoint file with git-theta.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "track")]
pub struct TrackArgs {
    /// checkpoint file to track
    #[argh(positional)]
    pub path: PathBuf,
}

pub async fn track(args: TrackArgs) -> Result<()> {
    let repo = GitRepo::discover(Path::new(".")).await?;
    let tracked = repo.relative_path(&args.path).display().to_string();

    let attributes_file = repo.gitattributes_file();
    let lines = read_gitattributes(&attributes_file)?;
    let updated = add_theta_to_gitattributes(&lines, &tracked);
    if updated == lines {
        info!(path = %tracked, "already tracked");
        return Ok(());
    }
    write_gitattributes(&attributes_file, &updated)
        .with_context(|| format!("writing {}", attributes_file.display()))?;
    repo.add_file(&attributes_file).await?;
    info!(path = %tracked, "tracking checkpoint");
    Ok(())
}
