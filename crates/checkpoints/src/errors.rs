use thiserror::Error;

/// Convenience result wrapper.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors raised while decoding or encoding checkpoints.
///
/// Every variant is fatal to the operation that hit it: a checkpoint either
/// decodes completely or not at all.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Bytes do not follow the handler's format.
    #[error("malformed checkpoint: {0}")]
    Malformed(String),

    /// No handler registered under the requested name.
    #[error("unknown checkpoint type {requested:?}, available: {available:?}")]
    UnknownType {
        requested: String,
        available: Vec<&'static str>,
    },

    /// Tensor payload failure inside the container.
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),

    /// Parameter naming failure inside the container.
    #[error(transparent)]
    Metadata(#[from] theta_metadata::MetadataError),
}
