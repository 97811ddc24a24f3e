//! Transport- and call-level error types.

use thiserror::Error;

use crate::node::Node;

/// Errors raised by a single wire exchange with one node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The node could not be reached (connection refused, DNS, TLS, reset).
    #[error("connection error: {0}")]
    Connect(String),

    /// The attempt did not complete within its timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Any other HTTP-level failure while sending or reading the body.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request could not be built; no bytes were sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if another node might succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout { .. } | Self::Http(_))
    }
}

/// Coarse classification of a [`CallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoNodeAvailable,
    Transport,
    Server,
    Client,
    Serialization,
    Deserialization,
    InvalidRequest,
    Exhausted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoNodeAvailable => "no_node_available",
            Self::Transport => "transport",
            Self::Server => "server",
            Self::Client => "client",
            Self::Serialization => "serialization",
            Self::Deserialization => "deserialization",
            Self::InvalidRequest => "invalid_request",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Why a logical call did not produce a usable payload.
///
/// Carried inside the result envelope rather than returned as `Err`: a caller
/// always receives diagnostics, whatever went wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The pool had no node to offer before the first attempt.
    #[error("no node available to send the request to")]
    NoNodeAvailable,

    /// The wire exchange with `node` failed.
    #[error("transport failure on {node}: {source}")]
    Transport {
        node: Node,
        #[source]
        source: TransportError,
    },

    /// The node answered with a 5xx-class (or throttling) status.
    #[error("server error {status} from {node}: {body}")]
    Server { node: Node, status: u16, body: String },

    /// The node rejected the request itself; retrying elsewhere cannot help.
    #[error("client error {status} from {node}: {body}")]
    Client { node: Node, status: u16, body: String },

    /// The request body could not be encoded.
    #[error("could not serialize request body: {0}")]
    Serialization(String),

    /// The exchange succeeded but the response body could not be decoded.
    #[error("could not deserialize response (status {status}): {message}")]
    Deserialization { status: u16, message: String },

    /// The call's path could not be resolved against a node.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retries ran out; `last` is the final real failure observed.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Box<CallError> },
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoNodeAvailable => ErrorKind::NoNodeAvailable,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Server { .. } => ErrorKind::Server,
            Self::Client { .. } => ErrorKind::Client,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Deserialization { .. } => ErrorKind::Deserialization,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
        }
    }

    /// The underlying failure, looking through [`CallError::Exhausted`].
    pub fn root_cause(&self) -> &CallError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Returns `true` if the failover loop should move on to another node.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_retryable(),
            Self::Server { .. } => true,
            _ => false,
        }
    }

    /// The HTTP status carried by this error, if a node answered at all.
    pub fn status(&self) -> Option<u16> {
        match self.root_cause() {
            Self::Server { status, .. }
            | Self::Client { status, .. }
            | Self::Deserialization { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Node the failure was observed on, if any.
    pub fn node(&self) -> Option<&Node> {
        match self.root_cause() {
            Self::Transport { node, .. }
            | Self::Server { node, .. }
            | Self::Client { node, .. } => Some(node),
            _ => None,
        }
    }
}
