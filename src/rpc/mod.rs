//! Typed RPC method dispatch.
//!
//! - [`Method`] describes a method's request, success and error types
//! - [`MethodHandler`] is the application logic behind a method
//! - [`MethodDispatcher`] decodes, invokes and classifies one call
//! - [`MethodRegistry`] is the method table the server dispatches through

mod context;
mod dispatcher;
mod fault;
mod handler;
mod method;
mod registry;
mod stream;

pub use context::{CallContext, CallHeaders, TraceContext};
pub use dispatcher::{Dispatch, MethodDispatcher, MethodSignature};
pub use fault::{SystemError, SystemErrorCode};
pub use handler::{BoxFuture, HandlerError, HandlerResult, MethodHandler};
pub use method::{Args, KnownError, Method, ResultEnvelope};
pub use registry::{MethodRegistry, MethodSchema, ServiceSchema};
pub use stream::ResponseStream;
