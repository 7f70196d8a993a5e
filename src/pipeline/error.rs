//! Error types for module handlers and the registry.

use axum::http::StatusCode;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::session::SessionError;

/// Failure raised by a module while handling a request.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The request cannot be served; answer the client with `status`.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("module failure: {0}")]
    Internal(String),
}

impl ModuleError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::status(StatusCode::FORBIDDEN, message)
    }

    /// HTTP status the listener should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors caused by the client rather than by the server.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Failure raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module registry has been disposed")]
    Disposed,

    #[error("a module named '{0}' is already registered")]
    DuplicateName(String),

    #[error("module '{0}' is already attached to a container")]
    AlreadyAttached(String),

    #[error("module '{name}' failed to start: {source}")]
    Start {
        name: String,
        #[source]
        source: ModuleError,
    },

    #[error("startup cancelled before module '{0}' started")]
    Cancelled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_keep_their_code() {
        let err = ModuleError::bad_request("preflight rejected");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
    }

    #[test]
    fn other_errors_are_server_faults() {
        let err = ModuleError::Internal("boom".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_client_error());

        let err: ModuleError = SessionError::NoSessionManager.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
