use folio_model::{ModelError, ReplaceError};
use thiserror::Error;

/// Why a step could not be applied to a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StepFailure(pub String);

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ReplaceError> for StepFailure {
    fn from(err: ReplaceError) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A step was rejected by the document it was applied to, usually
    /// because it was computed against a different document.
    #[error("Step failed: {0}")]
    StepFailed(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<StepFailure> for TransformError {
    fn from(failure: StepFailure) -> Self {
        TransformError::StepFailed(failure.0)
    }
}

#[derive(Debug, Error)]
pub enum StepJsonError {
    #[error("Invalid step JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid step content: {0}")]
    Model(#[from] ModelError),
}
