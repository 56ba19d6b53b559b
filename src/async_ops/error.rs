use crate::async_ops::types::OperationId;
use crate::atom::AtomError;
use crate::transport::TransportError;
use crate::util::UrlValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Another operation with the same correlation token is still in flight.
    #[error("user data must be unique: operation {0} is already in flight")]
    DuplicateIdentifier(OperationId),
}

/// Synchronous failures of [`submit`](super::AsyncDataHandler::submit).
///
/// None of these leave the operation registered.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("user data must be unique: operation {0} is already in flight")]
    DuplicateIdentifier(OperationId),
    #[error("Invalid target URI: {0}")]
    InvalidUri(#[from] UrlValidationError),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

impl From<RegistryError> for SubmitError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateIdentifier(id) => SubmitError::DuplicateIdentifier(id),
        }
    }
}

#[derive(Debug, Error)]
pub enum CopyError {
    /// The operation left the registry while its body was being copied.
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Failed to read response stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Error payload of a failed operation's completion event.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Internal only; converted into a cancelled completion, never reported as a failure.
    #[error("Operation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(TransportError),
    #[error("Parse error: {0}")]
    Parse(#[from] AtomError),
    #[error("Failed to read response stream: {0}")]
    Io(std::io::Error),
    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl From<TransportError> for OperationError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => OperationError::Cancelled,
            e => OperationError::Transport(e),
        }
    }
}

impl From<CopyError> for OperationError {
    fn from(e: CopyError) -> Self {
        match e {
            CopyError::Cancelled => OperationError::Cancelled,
            CopyError::Io(e) => OperationError::Io(e),
        }
    }
}
