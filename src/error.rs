//! Error types surfaced by dispatchers and transports.
//!
//! Two layers:
//!
//! - [`RemoteError`] is the serializable value that travels in a response's
//!   `headers.error`. It is produced on the answering side.
//! - [`IpcError`] is what callers of this crate see: registration failures,
//!   and the outcome of an `invoke` that did not resolve.

use crate::ids::{PeerId, RequestId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Category of a failure reported by the answering endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No handler pattern matched the request path.
    NoHandler,
    /// The handler ran and failed (returned an error or panicked).
    HandlerFailure,
}

/// Error value carried in a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    /// The "No handler found" error for `path`.
    #[must_use]
    pub fn no_handler(path: &str) -> Self {
        Self {
            kind: RemoteErrorKind::NoHandler,
            message: format!("No handler found for '{path}'"),
        }
    }

    /// A handler failure with the given message.
    #[must_use]
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::HandlerFailure,
            message: message.into(),
        }
    }

    /// Convert into the caller-facing error for a request sent to `path`.
    #[must_use]
    pub fn into_ipc_error(self, path: &str) -> IpcError {
        match self.kind {
            RemoteErrorKind::NoHandler => IpcError::NoHandlerFound {
                path: path.to_string(),
            },
            RemoteErrorKind::HandlerFailure => IpcError::HandlerFailure {
                message: self.message,
            },
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Failure to hand an envelope to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The target peer is not (or no longer) connected.
    PeerUnavailable(PeerId),
    /// The transport itself has shut down.
    Disconnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::PeerUnavailable(peer) => write!(f, "peer {peer} is not connected"),
            TransportError::Disconnected => write!(f, "transport disconnected"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors returned by dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    /// A handler is already registered under this exact pattern.
    ///
    /// Raised synchronously by `handle`; the existing handler stays in place.
    DuplicateHandler {
        /// The pattern that was already taken
        pattern: String,
    },
    /// The request path matched no handler on the answering side.
    NoHandlerFound {
        /// The path that was invoked
        path: String,
    },
    /// The handler failed; carries the handler's own error message.
    HandlerFailure {
        /// Message reported by the answering side
        message: String,
    },
    /// No resolving response arrived before the deadline.
    ResponseTimeout {
        /// Id of the request that timed out
        req_id: RequestId,
        /// The deadline that elapsed
        timeout: Duration,
    },
    /// The route pattern could not be compiled.
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },
    /// The transport refused the envelope.
    Transport(TransportError),
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::DuplicateHandler { pattern } => {
                write!(f, "Attempted to register a second handler for '{pattern}'")
            }
            IpcError::NoHandlerFound { path } => write!(f, "No handler found for '{path}'"),
            IpcError::HandlerFailure { message } => write!(f, "Handler failed: {message}"),
            IpcError::ResponseTimeout { req_id, timeout } => write!(
                f,
                "No response for request {req_id} within {}ms",
                timeout.as_millis()
            ),
            IpcError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid route pattern '{pattern}': {reason}")
            }
            IpcError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for IpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IpcError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for IpcError {
    fn from(e: TransportError) -> Self {
        IpcError::Transport(e)
    }
}
