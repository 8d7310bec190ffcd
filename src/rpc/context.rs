//! Per-call context: deadline, cancellation and trace metadata.
//!
//! The first envelope of every request payload is a [`CallHeaders`] value.
//! The server turns it into a [`CallContext`], links the context to the
//! connection's cancellation token and hands a clone to the handler. The
//! dispatcher never looks inside beyond [`CallContext::done`] and
//! [`CallContext::err`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;

/// Trace identifiers propagated with a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: u64,
    pub span_id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub sampled: bool,
}

/// Metadata envelope sent ahead of the call arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallHeaders {
    /// Relative timeout in milliseconds, measured from receipt of the frame.
    pub timeout_ms: Option<u64>,
    pub trace: Option<TraceContext>,
    pub baggage: BTreeMap<String, String>,
}

impl CallHeaders {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// Context handed to a method handler for the duration of one call.
///
/// Cheap to clone; clones share the cancellation token.
#[derive(Debug, Clone)]
pub struct CallContext {
    method_id: u16,
    request_id: u32,
    deadline: Option<Instant>,
    token: CancellationToken,
    trace: Option<TraceContext>,
    baggage: Arc<BTreeMap<String, String>>,
}

impl CallContext {
    /// A context with no deadline, a fresh token and no trace.
    pub fn new(method_id: u16, request_id: u32) -> Self {
        Self {
            method_id,
            request_id,
            deadline: None,
            token: CancellationToken::new(),
            trace: None,
            baggage: Arc::default(),
        }
    }

    /// Build a context from received headers.
    ///
    /// `default_timeout` applies when the caller sent no timeout of its own.
    pub fn from_headers(
        method_id: u16,
        request_id: u32,
        headers: CallHeaders,
        default_timeout: Option<Duration>,
    ) -> Self {
        let timeout = headers
            .timeout_ms
            .map(Duration::from_millis)
            .or(default_timeout);

        let mut ctx = Self::new(method_id, request_id);
        ctx.deadline = timeout.map(|t| Instant::now() + t);
        ctx.trace = headers.trace;
        ctx.baggage = Arc::new(headers.baggage);
        ctx
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Replace the cancellation token, e.g. with a child of the connection's.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.method_id
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn baggage(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    /// Time left before the deadline; `None` when the call has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this call and every clone of its context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why the call is done, or `None` while it may still proceed.
    ///
    /// Explicit cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<RpcError> {
        if self.token.is_cancelled() {
            return Some(RpcError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(RpcError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the call is cancelled or its deadline passes.
    pub async fn done(&self) -> RpcError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => RpcError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => RpcError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                RpcError::Cancelled
            }
        }
    }
}
