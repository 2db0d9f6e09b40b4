//! Error types for the PimStore server.

use crate::retrieval::RetrievalError;
use pimstore_protocol::{ProtocolError, Status};
use pimstore_storage::StorageError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can fail a command.
///
/// The `Display` form is the text of the tagged failure response.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A selector could not be decoded.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// A selector named an entity that does not exist in context.
    #[error("No such {kind}: {detail}")]
    NotFound {
        /// Entity kind (`collection`, `item`, `resource`).
        kind: &'static str,
        /// What was looked up.
        detail: String,
    },

    /// The command line was malformed.
    #[error("{0}")]
    Protocol(ProtocolError),

    /// The verb is not known.
    #[error("Unknown command {0}")]
    UnknownCommand(String),

    /// The command is well-formed but not allowed.
    #[error("{0}")]
    Rejected(String),

    /// The backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Fetching missing payload from the owning resource failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        if e.is_selector_error() {
            ServerError::InvalidSelector(e.to_string())
        } else {
            ServerError::Protocol(e)
        }
    }
}

impl ServerError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, detail: impl Into<String>) -> Self {
        ServerError::NotFound {
            kind,
            detail: detail.into(),
        }
    }

    /// Response status for this error.
    ///
    /// Commands the server could not parse are `BAD`; everything else is `NO`.
    pub fn status(&self) -> Status {
        match self {
            ServerError::Protocol(_) | ServerError::UnknownCommand(_) => Status::Bad,
            _ => Status::No,
        }
    }

    /// Returns true if the client caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidSelector(_)
                | ServerError::NotFound { .. }
                | ServerError::Protocol(_)
                | ServerError::UnknownCommand(_)
                | ServerError::Rejected(_)
        )
    }

    /// Returns true if the server or its backend failed.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Storage(_) | ServerError::Io(_) | ServerError::Internal(_)
        )
    }
}
