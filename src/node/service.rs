//! The node's RPC surface.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{FetchTaggedRequest, FetchTaggedResult, NodeError, NodeHealthResult};
use crate::rpc::{CallContext, HandlerResult, Method, MethodRegistry, ResponseStream};

/// `fetchTagged`: fetch series by ID and tag matchers over a time range.
pub struct FetchTagged;

impl Method for FetchTagged {
    const NAME: &'static str = "fetchTagged";
    type Request = FetchTaggedRequest;
    type Success = FetchTaggedResult;
    type Error = NodeError;
}

/// `health`: report node liveness and bootstrap state.
pub struct Health;

impl Method for Health {
    const NAME: &'static str = "health";
    type Request = ();
    type Success = NodeHealthResult;
    type Error = NodeError;
}

/// Application logic of a storage node.
#[async_trait]
pub trait NodeHandler: Send + Sync + 'static {
    async fn fetch_tagged(
        &self,
        ctx: CallContext,
        req: FetchTaggedRequest,
        stream: ResponseStream,
    ) -> HandlerResult<FetchTaggedResult, NodeError>;

    async fn health(&self, ctx: CallContext) -> HandlerResult<NodeHealthResult, NodeError>;
}

/// Bind `handler` to the node methods: `fetchTagged` then `health`.
pub fn register_node_service<H>(registry: &mut MethodRegistry, handler: Arc<H>)
where
    H: NodeHandler + ?Sized,
{
    let node = handler.clone();
    registry.register_fn::<FetchTagged, _, _>(move |ctx, req, stream| {
        let node = node.clone();
        async move { node.fetch_tagged(ctx, req, stream).await }
    });

    let node = handler;
    registry.register_fn::<Health, _, _>(move |ctx, (), _stream| {
        let node = node.clone();
        async move { node.health(ctx).await }
    });
}

/// A method table serving `handler` under the `node` service name.
pub fn node_registry<H>(handler: Arc<H>) -> MethodRegistry
where
    H: NodeHandler + ?Sized,
{
    let mut registry = MethodRegistry::new("node");
    register_node_service(&mut registry, handler);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    #[async_trait]
    impl NodeHandler for Down {
        async fn fetch_tagged(
            &self,
            _ctx: CallContext,
            _req: FetchTaggedRequest,
            _stream: ResponseStream,
        ) -> HandlerResult<FetchTaggedResult, NodeError> {
            Err(NodeError::internal("down").into())
        }

        async fn health(&self, _ctx: CallContext) -> HandlerResult<NodeHealthResult, NodeError> {
            Ok(NodeHealthResult {
                ok: false,
                status: "down".into(),
                bootstrapped: false,
            })
        }
    }

    #[test]
    fn test_method_ids() {
        let registry = node_registry(Arc::new(Down));

        assert_eq!(registry.method_id("fetchTagged"), Some(1));
        assert_eq!(registry.method_id("health"), Some(2));
    }

    #[test]
    fn test_registers_trait_objects() {
        let handler: Arc<dyn NodeHandler> = Arc::new(Down);
        let registry = node_registry(handler);

        assert_eq!(registry.len(), 2);
    }
}
