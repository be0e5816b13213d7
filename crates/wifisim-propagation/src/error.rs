use thiserror::Error;

/// Result alias for propagation model construction.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Errors raised while configuring propagation models.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// A parameter is outside the range the model accepts.
    #[error("Invalid {model} parameter '{name}': {reason}")]
    InvalidParameter {
        /// Model being configured.
        model: &'static str,
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A matrix entry names a node the scenario does not define.
    #[error("Unknown endpoint in matrix loss entry: {0}")]
    UnknownEndpoint(String),
}

impl PropagationError {
    pub(crate) fn invalid(model: &'static str, name: &'static str, reason: impl Into<String>) -> Self {
        PropagationError::InvalidParameter {
            model,
            name,
            reason: reason.into(),
        }
    }
}
