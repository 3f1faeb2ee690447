use theta_params::Oid;
use thiserror::Error;

/// Convenience result wrapper.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by object store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object is not present in the store; a fetch may recover it.
    #[error("object {0} not found in store")]
    NotFound(Oid),

    /// Pointer text did not follow the LFS v1 format.
    #[error("malformed lfs pointer: {0}")]
    MalformedPointer(String),

    /// Subprocess plumbing failed to launch or crashed.
    #[error("store subprocess {command:?} failed: {source}")]
    Subprocess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Subprocess finished with a non-zero status.
    #[error("store subprocess {command:?} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Push of a batch did not complete; the caller may retry.
    #[error("push of {count} objects to {remote:?} failed with status {status}")]
    PushFailed {
        remote: String,
        count: usize,
        status: i32,
    },

    /// Identifier failed validation.
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),
}
