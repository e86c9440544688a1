//! Error taxonomy for the relay.
//!
//! Every per-message error stays inside that message's pipeline. Only
//! [`ConfigError`] (and client construction in the binary) can stop the
//! process, and only before the relay starts running.

use std::time::Duration;

use thiserror::Error;

/// Invalid or missing startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// A queued body could not be turned back into the original bytes.
///
/// Permanent for that message: it is left on the queue for external redrive.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body is flagged as base64 but does not decode: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Why a single forward attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// The local service answered with a non-2xx status.
    Status,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// The connection could not be established (refused, DNS, TLS).
    Connect,
    /// Any other transport failure.
    Transport,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::Status => "status",
            TransientKind::Timeout => "timeout",
            TransientKind::Connect => "connect",
            TransientKind::Transport => "transport",
        }
    }
}

/// Failure reported by a [`LocalTarget`](crate::forward::LocalTarget) before any
/// status code was received.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} failure: {detail}")]
pub struct TransportFailure {
    pub kind: TransientKind,
    pub detail: String,
}

impl TransportFailure {
    pub fn new(kind: TransientKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// One failed attempt that may still be retried.
#[derive(Debug, Clone, Error)]
#[error("attempt {attempt} failed ({}): {detail}", kind.as_str())]
pub struct ForwardTransientError {
    pub attempt: u32,
    pub status: Option<u16>,
    pub kind: TransientKind,
    pub detail: String,
}

/// Every attempt in the budget failed.
#[derive(Debug, Clone, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct ForwardExhaustedError {
    pub attempts: u32,
    pub last: ForwardTransientError,
}

/// A call against the queue collaborator failed.
#[derive(Debug, Clone, Error)]
#[error("queue {operation} failed: {message}")]
pub struct QueueTransportError {
    pub operation: &'static str,
    pub message: String,
}

impl QueueTransportError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Extending a message's visibility failed. The message may be redelivered.
#[derive(Debug, Clone, Error)]
#[error("could not extend visibility by {timeout:?} after {elapsed:?}: {source}")]
pub struct VisibilityExtendError {
    pub timeout: Duration,
    pub elapsed: Duration,
    #[source]
    pub source: QueueTransportError,
}
