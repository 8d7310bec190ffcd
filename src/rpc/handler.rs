//! Method handler interface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::{CallContext, Method, ResponseStream};
use crate::error::BoxError;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure returned by a handler.
#[derive(Debug)]
pub enum HandlerError<E> {
    /// A value of the method's typed error. Sent to the caller in `err`.
    Domain(E),
    /// Anything else. Fails the call unless it turns out to hold an `E`.
    Other(BoxError),
}

impl<E> HandlerError<E> {
    pub fn other(err: impl Into<BoxError>) -> Self {
        HandlerError::Other(err.into())
    }
}

impl<E> From<E> for HandlerError<E> {
    fn from(err: E) -> Self {
        HandlerError::Domain(err)
    }
}

impl<E: fmt::Display> fmt::Display for HandlerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Domain(e) => write!(f, "{e}"),
            HandlerError::Other(e) => write!(f, "{e}"),
        }
    }
}

pub type HandlerResult<S, E> = Result<S, HandlerError<E>>;

/// Application logic behind one method.
///
/// Called concurrently from many tasks. The context and stream are owned
/// clones; the stream stops accepting chunks once the call ends.
pub trait MethodHandler<M: Method>: Send + Sync + 'static {
    fn call(
        &self,
        ctx: CallContext,
        req: M::Request,
        stream: ResponseStream,
    ) -> BoxFuture<'static, HandlerResult<M::Success, M::Error>>;
}

impl<M, F, Fut> MethodHandler<M> for F
where
    M: Method,
    F: Fn(CallContext, M::Request, ResponseStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<M::Success, M::Error>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        req: M::Request,
        stream: ResponseStream,
    ) -> BoxFuture<'static, HandlerResult<M::Success, M::Error>> {
        Box::pin((self)(ctx, req, stream))
    }
}
