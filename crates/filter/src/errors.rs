use theta_params::Oid;
use thiserror::Error;

/// Convenience result wrapper.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised by the clean/smudge pipelines.
///
/// Every variant aborts the running operation: clean never emits a partial
/// manifest and smudge never writes a partial checkpoint.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Checkpoint bytes could not be decoded or encoded.
    #[error(transparent)]
    Checkpoint(#[from] theta_checkpoints::CheckpointError),

    /// Object store failure; `NotFound` means the object needs fetching.
    #[error(transparent)]
    Store(#[from] theta_store::StoreError),

    /// Update kind failure.
    #[error(transparent)]
    Update(#[from] theta_updates::UpdateError),

    /// Manifest failure.
    #[error(transparent)]
    Metadata(#[from] theta_metadata::MetadataError),

    /// Tensor-level failure.
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),

    /// Rebuilt tensor does not hash to the manifest's identity.
    #[error("integrity failure for {name}: manifest says {expected}, rebuilt {actual}")]
    Integrity {
        name: String,
        expected: Oid,
        actual: Oid,
    },

    /// A delta chain references a manifest that does not exist.
    #[error("no manifest for {path} at commit {commit}")]
    ManifestUnavailable { path: String, commit: String },

    /// A delta chain references a parameter missing from an earlier manifest.
    #[error("parameter {name} missing from manifest at commit {commit}")]
    MissingEntry { name: String, commit: String },

    /// An incremental entry has no commit anchor to chain through.
    #[error("parameter {name} has an incremental update but no last commit")]
    MissingAnchor { name: String },

    /// The update envelope object is not valid JSON.
    #[error("malformed update envelope {oid}: {reason}")]
    MalformedEnvelope { oid: Oid, reason: String },

    /// Git plumbing failed to launch.
    #[error("git {command:?} failed: {source}")]
    GitIo {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Git plumbing exited with a failure we cannot interpret.
    #[error("git {command:?} exited with {status}: {stderr}")]
    GitCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    /// The working directory is not inside a git repository.
    #[error("not inside a git repository")]
    NotARepository,

    /// File I/O around the pipelines.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
