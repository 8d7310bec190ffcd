//! Method descriptors and the request/response envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// The closed error type a method may return to its caller.
///
/// Values of this type are application outcomes, serialized into the
/// response's `err` slot. The `Default` value is the *vacant* error: a typed
/// error carrying nothing, which the dispatcher refuses to put on the wire.
/// Error types should keep the default out of reach of their constructors,
/// or a real error equal to it is treated as vacant.
pub trait KnownError:
    Serialize
    + DeserializeOwned
    + std::error::Error
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
{
    /// True for the zero value of the type.
    fn is_vacant(&self) -> bool {
        *self == Self::default()
    }

    /// Recover a value of this type from an untyped handler error.
    ///
    /// Returns the original error untouched if it is something else.
    fn recover(err: BoxError) -> Result<Self, BoxError> {
        err.downcast::<Self>().map(|e| *e)
    }
}

/// Static description of one RPC method.
pub trait Method: Send + Sync + 'static {
    /// Method name in the method table.
    const NAME: &'static str;

    type Request: Serialize + DeserializeOwned + Send + 'static;
    type Success: Serialize + DeserializeOwned + Send + 'static;
    type Error: KnownError;
}

/// Argument envelope: the single required `req` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Args<T> {
    pub req: T,
}

impl<T> Args<T> {
    pub fn new(req: T) -> Self {
        Self { req }
    }
}

/// Response envelope holding at most one of a success payload or a typed
/// error. Setting either slot clears the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<S, E> {
    success: Option<S>,
    err: Option<E>,
}

impl<S, E> ResultEnvelope<S, E> {
    /// An empty envelope.
    pub fn new() -> Self {
        Self {
            success: None,
            err: None,
        }
    }

    pub fn from_success(success: S) -> Self {
        Self {
            success: Some(success),
            err: None,
        }
    }

    pub fn from_err(err: E) -> Self {
        Self {
            success: None,
            err: Some(err),
        }
    }

    pub fn set_success(&mut self, success: S) {
        self.success = Some(success);
        self.err = None;
    }

    pub fn set_err(&mut self, err: E) {
        self.err = Some(err);
        self.success = None;
    }

    /// Clear both slots.
    pub fn reset(&mut self) {
        self.success = None;
        self.err = None;
    }

    pub fn success(&self) -> Option<&S> {
        self.success.as_ref()
    }

    pub fn err(&self) -> Option<&E> {
        self.err.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.err.is_none()
    }

    /// `None` for an empty envelope.
    pub fn into_result(self) -> Option<Result<S, E>> {
        match (self.success, self.err) {
            (_, Some(err)) => Some(Err(err)),
            (Some(success), None) => Some(Ok(success)),
            (None, None) => None,
        }
    }
}

impl<S, E> Default for ResultEnvelope<S, E> {
    fn default() -> Self {
        Self::new()
    }
}
