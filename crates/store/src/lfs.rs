//! git-lfs backed object store.
//!
//! `put` pipes the bytes through `git lfs clean`, which writes the object
//! into the local LFS storage and prints the pointer; `get` feeds the
//! pointer back through `git lfs smudge`, which may hit the network to
//! fetch a missing object; `push` uses `git lfs push --object-id`. All
//! commands run in the repository's working directory.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use theta_params::Oid;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::{LfsPointer, ObjectStore, StoreError, StoreResult};

/// Object store addressed through the git-lfs helper binaries.
#[derive(Clone, Debug)]
pub struct LfsObjectStore {
    repo_root: PathBuf,
}

impl LfsObjectStore {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    async fn run_lfs(&self, args: &[&str], input: Option<&[u8]>) -> StoreResult<Vec<u8>> {
        let command_line = format!("git lfs {}", args.join(" "));
        let mut command = Command::new("git");
        command
            .arg("lfs")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| StoreError::Subprocess {
            command: command_line.clone(),
            source,
        })?;
        if let Some(bytes) = input {
            let mut stdin = child.stdin.take().expect("stdin was piped");
            stdin
                .write_all(bytes)
                .await
                .map_err(|source| StoreError::Subprocess {
                    command: command_line.clone(),
                    source,
                })?;
            drop(stdin);
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| StoreError::Subprocess {
                command: command_line.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(StoreError::CommandFailed {
                command: command_line,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ObjectStore for LfsObjectStore {
    async fn put(&self, bytes: &[u8]) -> StoreResult<Oid> {
        let stdout = self.run_lfs(&["clean"], Some(bytes)).await?;
        let text = String::from_utf8_lossy(&stdout);
        let pointer = LfsPointer::parse(&text)?;
        debug!(oid = %pointer.oid, size = pointer.size, "stored object");
        Ok(pointer.oid)
    }

    async fn get(&self, pointer: &LfsPointer) -> StoreResult<Vec<u8>> {
        let text = pointer.to_string();
        match self.run_lfs(&["smudge"], Some(text.as_bytes())).await {
            Ok(bytes) => Ok(bytes),
            // The smudge helper reports missing objects as a failure; map it
            // to the retriable NotFound so callers can suggest a fetch.
            Err(StoreError::CommandFailed { .. }) => Err(StoreError::NotFound(pointer.oid)),
            Err(e) => Err(e),
        }
    }

    async fn push(&self, oids: &[Oid], remote: &str) -> StoreResult<()> {
        if oids.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = oids.iter().map(|oid| oid.to_string()).collect();
        let mut args = vec!["push", "--object-id", remote];
        args.extend(rendered.iter().map(|s| s.as_str()));
        debug!(count = oids.len(), remote, "pushing objects");
        match self.run_lfs(&args, None).await {
            Ok(_) => Ok(()),
            Err(StoreError::CommandFailed { status, .. }) => Err(StoreError::PushFailed {
                remote: remote.to_owned(),
                count: oids.len(),
                status,
            }),
            Err(e) => Err(e),
        }
    }
}
