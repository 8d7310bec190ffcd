//! Error types for nodewire.
//!
//! [`RpcError`] covers everything that fails a call at the transport level.
//! Typed application errors never appear here: they travel inside the
//! response envelope (see [`crate::rpc::ResultEnvelope`]).

use thiserror::Error;

/// Boxed error returned by handlers for failures outside their typed error set.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all transport-level failures.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (service schema only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, wrong flags, trailing bytes, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Listen address that is not `tcp://host:port` or `unix://path`.
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    /// No method registered under the given ID.
    #[error("No method registered for method ID: {0}")]
    MethodNotFound(u16),

    /// The handler failed with an error outside the method's typed error set.
    #[error("Unclassified error from handler for {method}: {source}")]
    Unclassified {
        method: &'static str,
        #[source]
        source: BoxError,
    },

    /// The handler produced the typed error but left it without a value.
    #[error("Handler for {method} returned a typed error with no value")]
    VacantTypedError { method: &'static str },

    /// The call was cancelled before a response was written.
    #[error("Call cancelled")]
    Cancelled,

    /// The call deadline passed before a response was written.
    #[error("Call deadline exceeded")]
    DeadlineExceeded,

    /// The handler tried to stream after its call completed.
    #[error("Response stream closed")]
    StreamClosed,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl RpcError {
    /// True for failures caused by an unreadable request frame.
    pub fn is_decode_fault(&self) -> bool {
        matches!(self, RpcError::MsgPackDecode(_) | RpcError::Protocol(_))
    }

    /// True when the call ended because its context was done.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RpcError::Cancelled | RpcError::DeadlineExceeded)
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
