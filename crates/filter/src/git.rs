//! Git plumbing over subprocesses.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use theta_params::CommitHash;
use tokio::process::Command;
use tracing::debug;

use crate::{FilterError, FilterResult};

/// Handle on the enclosing git repository.
#[derive(Clone, Debug)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `dir`.
    pub async fn discover(dir: &Path) -> FilterResult<Self> {
        let output = run_git(dir, &["rev-parse", "--show-toplevel"]).await?;
        match output {
            GitOutput::Success(stdout) => {
                let root = PathBuf::from(String::from_utf8_lossy(&stdout).trim());
                Ok(Self { root })
            }
            GitOutput::Failure { .. } => Err(FilterError::NotARepository),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repo-relative rendering of `path`.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        absolute
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    }

    /// Current HEAD commit, or `None` in an unborn repository.
    pub async fn head_commit(&self) -> FilterResult<Option<CommitHash>> {
        match run_git(&self.root, &["rev-parse", "HEAD"]).await? {
            GitOutput::Success(stdout) => {
                let text = String::from_utf8_lossy(&stdout);
                let commit = text
                    .trim()
                    .parse::<CommitHash>()
                    .map_err(theta_params::ParamError::from)?;
                Ok(Some(commit))
            }
            GitOutput::Failure { .. } => Ok(None),
        }
    }

    /// Contents of `path` in the tree of `revision`, or `None` when the
    /// file (or revision) does not exist.
    pub async fn file_at(&self, revision: &str, path: &str) -> FilterResult<Option<Vec<u8>>> {
        let spec = format!("{revision}:{path}");
        match run_git(&self.root, &["show", &spec]).await? {
            GitOutput::Success(stdout) => Ok(Some(stdout)),
            GitOutput::Failure { .. } => Ok(None),
        }
    }

    /// Every tracked path in the repository.
    pub async fn ls_files(&self) -> FilterResult<Vec<String>> {
        match run_git(&self.root, &["ls-files"]).await? {
            GitOutput::Success(stdout) => Ok(String::from_utf8_lossy(&stdout)
                .lines()
                .map(str::to_owned)
                .collect()),
            GitOutput::Failure { status, stderr } => Err(FilterError::GitCommand {
                command: "ls-files".to_owned(),
                status,
                stderr,
            }),
        }
    }

    /// Stage a file.
    pub async fn add_file(&self, path: &Path) -> FilterResult<()> {
        debug!(path = %path.display(), "staging file");
        let rendered = path.display().to_string();
        match run_git(&self.root, &["add", &rendered]).await? {
            GitOutput::Success(_) => Ok(()),
            GitOutput::Failure { status, stderr } => Err(FilterError::GitCommand {
                command: format!("add {rendered}"),
                status,
                stderr,
            }),
        }
    }

    /// Path of the repository's `.gitattributes`.
    pub fn gitattributes_file(&self) -> PathBuf {
        self.root.join(".gitattributes")
    }

    /// Path of the repository's hooks directory.
    pub async fn hooks_dir(&self) -> FilterResult<PathBuf> {
        match run_git(&self.root, &["rev-parse", "--git-dir"]).await? {
            GitOutput::Success(stdout) => {
                let git_dir = PathBuf::from(String::from_utf8_lossy(&stdout).trim());
                let git_dir = if git_dir.is_absolute() {
                    git_dir
                } else {
                    self.root.join(git_dir)
                };
                Ok(git_dir.join("hooks"))
            }
            GitOutput::Failure { status, stderr } => Err(FilterError::GitCommand {
                command: "rev-parse --git-dir".to_owned(),
                status,
                stderr,
            }),
        }
    }
}

enum GitOutput {
    Success(Vec<u8>),
    Failure { status: i32, stderr: String },
}

async fn run_git(dir: &Path, args: &[&str]) -> FilterResult<GitOutput> {
    let command_line = args.join(" ");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| FilterError::GitIo {
            command: command_line,
            source,
        })?;
    if output.status.success() {
        Ok(GitOutput::Success(output.stdout))
    } else {
        Ok(GitOutput::Failure {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
