//! Fault frame payloads.

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Category of a transport-level failure reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemErrorCode {
    Unexpected,
    BadRequest,
    Timeout,
    Busy,
}

/// Payload of a `FAULT` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct SystemError {
    pub code: SystemErrorCode,
    pub message: String,
}

impl SystemError {
    pub fn new(code: SystemErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The fault to report for a failed call.
    ///
    /// `None` when nothing should be written: the call was cancelled, or the
    /// connection is already gone.
    pub fn from_rpc_error(err: &RpcError) -> Option<Self> {
        let code = match err {
            RpcError::Cancelled | RpcError::ConnectionClosed => return None,
            RpcError::MsgPackDecode(_) | RpcError::Protocol(_) | RpcError::MethodNotFound(_) => {
                SystemErrorCode::BadRequest
            }
            RpcError::DeadlineExceeded => SystemErrorCode::Timeout,
            RpcError::BackpressureTimeout => SystemErrorCode::Busy,
            _ => SystemErrorCode::Unexpected,
        };
        Some(Self::new(code, err.to_string()))
    }
}
