//! Engine error type shared by the services

use crate::provider::ProviderError;
use crate::scheduler::ScheduleError;
use crate::scm::ScmError;
use crate::service::activity::ActivityError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduling(#[from] ScheduleError),

    #[error(transparent)]
    Scm(#[from] ScmError),
}

impl From<ActivityError> for EngineError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::InvalidState { .. } => EngineError::InvalidState(err.to_string()),
            ActivityError::StageOutOfRange(_) | ActivityError::StepOutOfRange { .. } => {
                EngineError::Validation(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
