use thiserror::Error;

use crate::Dtype;

/// Convenience result wrapper.
pub type ParamResult<T> = Result<T, ParamError>;

/// Errors that can occur while working with tensor values.
#[derive(Debug, Error)]
pub enum ParamError {
    /// String is not a 64-digit lowercase hex object id.
    #[error("invalid object id {0:?}")]
    InvalidOid(String),

    /// String is not a 40-digit lowercase hex commit hash.
    #[error("invalid commit hash {0:?}")]
    InvalidCommitHash(String),

    /// Dtype string not recognized by this implementation.
    #[error("unknown dtype {0:?}")]
    UnknownDtype(String),

    /// Serialized tensor bytes do not follow the canonical layout.
    #[error("malformed tensor buffer: {0}")]
    Malformed(String),

    /// Buffer ended before the declared payload.
    #[error("truncated tensor buffer: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Operation requires a float tensor.
    #[error("expected a float tensor, got dtype {0}")]
    NotFloat(Dtype),

    /// Operation requires an integer tensor.
    #[error("expected an integer tensor, got dtype {0}")]
    NotInt(Dtype),

    /// Two tensors were expected to share a shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}
