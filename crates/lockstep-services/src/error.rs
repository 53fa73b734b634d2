use lockstep_core::StoreError;
use thiserror::Error;

/// Failure reported by a collaborator
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Link error: {0}")]
    Link(String),
    #[error("No proximity link available for {0}")]
    LinkUnavailable(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Not found: {0}")]
    NotFound(String),
}
