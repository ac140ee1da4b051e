//! Client error types.

use thiserror::Error;

use crate::realtime::TransportError;
use crate::storage::StorageError;

/// Errors returned by trailsync client operations.
///
/// Only [`ClientError::Unauthorized`] (HTTP 401) means the session is gone.
/// Every other HTTP failure, including 403 and 429, is surfaced to the
/// caller without touching local auth state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connectivity lost or request could not be sent.
    #[error("network error: {0}")]
    Network(String),

    /// Server rejected the bearer token (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success HTTP status.
    #[error("server returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Realtime transport failed.
    #[error("realtime error: {0}")]
    Transport(#[from] TransportError),

    /// Operation requires a logged-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Login state changed while the request was in flight; the response was dropped.
    #[error("auth state changed during request")]
    AuthChanged,

    /// Server sent something the client did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether this error must force a sign-out.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized => Some(401),
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_401_is_unauthorized() {
        assert!(ClientError::Unauthorized.is_unauthorized());
        let forbidden = ClientError::Http {
            status: 403,
            message: "forbidden".into(),
        };
        assert!(!forbidden.is_unauthorized());
        assert_eq!(forbidden.status(), Some(403));
    }

    #[test]
    fn retryable_errors() {
        assert!(ClientError::Network("reset".into()).is_retryable());
        assert!(ClientError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Http {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Unauthorized.is_retryable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientError>();
    }
}
