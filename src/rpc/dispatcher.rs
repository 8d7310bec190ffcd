//! Typed method dispatch.
//!
//! [`MethodDispatcher`] is the one generic implementation of the
//! decode → invoke → classify sequence. It is parameterized by a [`Method`]
//! (request, success and error types) and a [`MethodHandler`]. The method
//! table stores dispatchers behind the object-safe [`Dispatch`] trait, whose
//! `call` also encodes the response.
//!
//! Outcome policy:
//!
//! | handler outcome | result |
//! |-----------------|--------|
//! | `Ok(s)` | `success = s`, handled |
//! | `Domain(e)`, `e` not vacant | `err = e`, handled |
//! | `Domain(e)`, `e` vacant | [`RpcError::VacantTypedError`] |
//! | `Other(b)`, `b` holds an `E` | as `Domain` |
//! | `Other(b)` otherwise | [`RpcError::Unclassified`] |
//! | context done first | [`RpcError::Cancelled`] / [`RpcError::DeadlineExceeded`] |

use std::any::type_name;
use std::marker::PhantomData;

use tracing::Instrument;

use super::handler::BoxFuture;
use super::{
    Args, CallContext, HandlerError, KnownError, Method, MethodHandler, ResponseStream,
    ResultEnvelope,
};
use crate::error::{Result, RpcError};
use crate::protocol::BinaryProtocol;

/// Type names of a method's envelopes, for the service schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    pub request: &'static str,
    pub success: &'static str,
    pub error: &'static str,
}

/// Type-erased dispatch entry stored in the method table.
pub trait Dispatch: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn signature(&self) -> MethodSignature;

    /// Dispatch one call and write the response envelope to `protocol`.
    ///
    /// `Err` means nothing was written and the call failed at the
    /// transport level.
    fn call<'a>(
        &'a self,
        ctx: CallContext,
        protocol: &'a mut BinaryProtocol,
        stream: ResponseStream,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Dispatcher for method `M` backed by handler `H`.
pub struct MethodDispatcher<M, H> {
    handler: H,
    _method: PhantomData<fn() -> M>,
}

impl<M, H> MethodDispatcher<M, H>
where
    M: Method,
    H: MethodHandler<M>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _method: PhantomData,
        }
    }

    /// Decode the arguments, run the handler and classify its outcome.
    ///
    /// `Ok` means the call was handled: the envelope holds either the
    /// success payload or a typed error.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        protocol: &mut BinaryProtocol,
        stream: ResponseStream,
    ) -> Result<ResultEnvelope<M::Success, M::Error>> {
        let mut response = ResultEnvelope::new();
        self.dispatch_into(ctx, protocol, stream, &mut response)
            .await?;
        Ok(response)
    }

    /// Like [`dispatch`](Self::dispatch), filling a caller-owned envelope.
    ///
    /// The envelope is cleared once the arguments decode, before the
    /// handler runs. On a decode fault it is left untouched.
    pub async fn dispatch_into(
        &self,
        ctx: &CallContext,
        protocol: &mut BinaryProtocol,
        stream: ResponseStream,
        response: &mut ResultEnvelope<M::Success, M::Error>,
    ) -> Result<()> {
        let args: Args<M::Request> = protocol.read()?;
        protocol.finish_read()?;

        response.reset();

        let call = self.handler.call(ctx.clone(), args.req, stream.clone());
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            outcome = call => Ok(outcome),
        };
        stream.close();

        let outcome = outcome?;
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        match outcome {
            Ok(success) => response.set_success(success),
            Err(HandlerError::Domain(err)) => response.set_err(Self::typed(err)?),
            Err(HandlerError::Other(source)) => match M::Error::recover(source) {
                Ok(err) => response.set_err(Self::typed(err)?),
                Err(source) => {
                    return Err(RpcError::Unclassified {
                        method: M::NAME,
                        source,
                    })
                }
            },
        }

        Ok(())
    }

    fn typed(err: M::Error) -> Result<M::Error> {
        if err.is_vacant() {
            return Err(RpcError::VacantTypedError { method: M::NAME });
        }
        Ok(err)
    }
}

impl<M, H> Dispatch for MethodDispatcher<M, H>
where
    M: Method,
    H: MethodHandler<M>,
{
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn signature(&self) -> MethodSignature {
        MethodSignature {
            request: type_name::<M::Request>(),
            success: type_name::<M::Success>(),
            error: type_name::<M::Error>(),
        }
    }

    fn call<'a>(
        &'a self,
        ctx: CallContext,
        protocol: &'a mut BinaryProtocol,
        stream: ResponseStream,
    ) -> BoxFuture<'a, Result<()>> {
        let span = tracing::debug_span!(
            "rpc.dispatch",
            method = M::NAME,
            request_id = ctx.request_id(),
            trace_id = ctx.trace().map(|t| t.trace_id),
        );

        Box::pin(
            async move {
                match self.dispatch(&ctx, protocol, stream).await {
                    Ok(response) => {
                        if let Some(err) = response.err() {
                            tracing::debug!(error = %err, "Call returned typed error");
                        }
                        protocol.write(&response)
                    }
                    Err(e) if e.is_cancellation() => {
                        tracing::debug!(error = %e, "Call ended before response");
                        Err(e)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Call failed");
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }
}
