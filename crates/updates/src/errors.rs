use theta_metadata::UpdateType;
use thiserror::Error;

/// Convenience result wrapper.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors raised while calculating or applying updates.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The kind cannot encode this change. The caller may retry with dense
    /// but must do so explicitly.
    #[error("{update_type} update inapplicable: {reason}")]
    Inapplicable {
        update_type: UpdateType,
        reason: String,
    },

    /// Every incremental kind needs the previous value.
    #[error("{0} update requires a previous value")]
    MissingPrevious(UpdateType),

    /// A record is missing one of the kind's required fields.
    #[error("{update_type} update record missing field {key:?}")]
    MissingKey {
        update_type: UpdateType,
        key: &'static str,
    },

    /// A record carries a field the kind does not define.
    #[error("{update_type} update record has unexpected field {key:?}")]
    UnexpectedKey { update_type: UpdateType, key: String },

    /// Tensor-level failure (shape, dtype, payload).
    #[error(transparent)]
    Param(#[from] theta_params::ParamError),
}

impl UpdateError {
    pub(crate) fn inapplicable(update_type: UpdateType, reason: impl Into<String>) -> Self {
        Self::Inapplicable {
            update_type,
            reason: reason.into(),
        }
    }
}
