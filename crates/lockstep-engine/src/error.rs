use lockstep_core::{CodeError, DeviceId, ModelError, SyncVersion};
use lockstep_services::ServiceError;
use thiserror::Error;

/// Failure of an engine operation or workflow
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown device model: {0}")]
    UnknownModel(String),
    #[error("Invalid code: {0}")]
    InvalidCode(String),
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("User-sync document changed concurrently (wrote {attempted})")]
    SyncConflict {
        attempted: SyncVersion,
        current: Option<SyncVersion>,
    },
    #[error("Admin code incorrect")]
    AdminCodeIncorrect,
    #[error("Admin code has not been set")]
    AdminCodeNotSet,
    #[error("Provisioning failed: {0}")]
    ProvisionFailed(String),
    #[error("Device could not join Wi-Fi")]
    WifiFailed,
    #[error("Cloud registration failed")]
    CloudRegistrationFailed,
    #[error("Timed out waiting for the device")]
    Timeout,
    #[error("Device rejected the factory reset")]
    ResetRejected,
    #[error("Device rejected {0}")]
    CommandRejected(&'static str),
    #[error("Provisioning watcher has stopped")]
    WatcherClosed,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl EngineError {
    pub(crate) fn unreachable(identifier: &DeviceId) -> Self {
        Self::DeviceUnreachable(identifier.to_string())
    }

    /// Translate a link failure, treating a missing link as an unreachable device
    pub(crate) fn from_link(identifier: &DeviceId, error: ServiceError) -> Self {
        match error {
            ServiceError::LinkUnavailable(_) => Self::unreachable(identifier),
            other => Self::Service(other),
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::UnknownModel(model) => Self::UnknownModel(model),
            other => Self::UnknownModel(other.to_string()),
        }
    }
}

impl From<CodeError> for EngineError {
    fn from(error: CodeError) -> Self {
        match error {
            CodeError::InvalidCode(reason) => Self::InvalidCode(reason),
        }
    }
}
