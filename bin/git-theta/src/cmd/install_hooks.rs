//! `git-theta install-hooks`: wire the push hook into the repository.

use std::path::Path;

use anyhow::{Context, Result};
use argh::FromArgs;
use theta_filter::GitRepo;
use tracing::info;

const PRE_PUSH_HOOK: &str = "#!/bin/sh\n# Installed by git-theta.\nexec git-theta push \"$1\"\n";

/// Install the git hooks git-theta needs.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "install-hooks")]
pub struct InstallHooksArgs {}

pub async fn install_hooks(_args: InstallHooksArgs) -> Result<()> {
    let repo = GitRepo::discover(Path::new(".")).await?;
    let hooks_dir = repo.hooks_dir().await?;
    std::fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("creating {}", hooks_dir.display()))?;

    let hook_path = hooks_dir.join("pre-push");
    if std::fs::read_to_string(&hook_path).is_ok_and(|s| s == PRE_PUSH_HOOK) {
        info!("pre-push hook already installed");
        return Ok(());
    }
    std::fs::write(&hook_path, PRE_PUSH_HOOK)
        .with_context(|| format!("writing {}", hook_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755))?;
    }
    info!(hook = %hook_path.display(), "installed pre-push hook");
    Ok(())
}
