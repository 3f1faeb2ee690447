use thiserror::Error;

/// Convenience result wrapper.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors raised by the merge engine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The user quit; the working tree is left untouched.
    #[error("merge aborted by user")]
    UserAbort,

    /// Materialization or storage failure while resolving a parameter.
    #[error(transparent)]
    Filter(#[from] theta_filter::FilterError),

    /// Manifest could not be read or written.
    #[error(transparent)]
    Metadata(#[from] theta_metadata::MetadataError),

    /// Tensor math failure inside an action.
    #[error(transparent)]
    Update(#[from] theta_updates::UpdateError),

    /// Tensor-level failure inside an action.
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),

    /// An action cannot run with the tensors it was given.
    #[error("action {action} failed for {name}: {reason}")]
    ActionFailed {
        action: &'static str,
        name: String,
        reason: String,
    },

    /// The prompter returned something outside the allowed set.
    #[error("input {0:?} is not an allowed action")]
    UnknownAction(String),

    /// Terminal interaction failed.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// File I/O around the driver.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
