use thiserror::Error;

/// Convenience result wrapper.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while reading or writing manifests.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Manifest text is not valid JSON.
    #[error("manifest is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// A leaf record is missing one of its required sub-records or fields.
    #[error("malformed record for parameter {name}: {reason}")]
    MalformedRecord { name: String, reason: String },

    /// A name component collides with a nested group of the same name.
    #[error("parameter {0} is both a value and a group")]
    NameCollision(String),

    /// Parameter names must have at least one component.
    #[error("empty parameter name")]
    EmptyName,

    /// Identifier fields failed validation.
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),

    /// Manifest file could not be read or written.
    #[error("manifest io: {0}")]
    Io(#[from] std::io::Error),
}
