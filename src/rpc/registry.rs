//! Method table mapping method IDs to dispatchers.
//!
//! IDs are assigned sequentially starting from 1 (0 is reserved, 0xFFFF is
//! the abort frame).
//!
//! # Example
//!
//! ```ignore
//! let mut registry = MethodRegistry::new("node");
//!
//! registry.register_fn::<Lookup, _, _>(|_ctx, key, _stream| async move {
//!     Ok(key.len() as u64)
//! });
//!
//! println!("{}", registry.build_schema().to_json()?);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use serde::{Deserialize, Serialize};

use super::{
    CallContext, Dispatch, HandlerResult, Method, MethodDispatcher, MethodHandler,
    ResponseStream,
};
use crate::error::{Result, RpcError};
use crate::protocol::{BinaryProtocol, ABORT_METHOD_ID};

/// One method as published in the service schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSchema {
    pub id: u16,
    pub request: String,
    pub success: String,
    pub error: String,
}

/// Description of a method table, published as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub service: String,
    pub abort_method_id: u16,
    pub methods: BTreeMap<String, MethodSchema>,
}

impl ServiceSchema {
    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.get(name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Registry of the methods served on a connection.
pub struct MethodRegistry {
    service: String,
    methods: HashMap<u16, Box<dyn Dispatch>>,
    ids: HashMap<&'static str, u16>,
    next_method_id: u16,
}

impl MethodRegistry {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            methods: HashMap::new(),
            ids: HashMap::new(),
            next_method_id: 1,
        }
    }

    /// Register a handler for method `M` and return its ID.
    ///
    /// Registering a name twice replaces the handler and keeps the ID.
    pub fn register<M, H>(&mut self, handler: H) -> u16
    where
        M: Method,
        H: MethodHandler<M>,
    {
        let dispatcher: Box<dyn Dispatch> = Box::new(MethodDispatcher::<M, H>::new(handler));

        if let Some(&id) = self.ids.get(M::NAME) {
            tracing::warn!(method = M::NAME, id, "Replacing registered method");
            self.methods.insert(id, dispatcher);
            return id;
        }

        let id = self.next_method_id;
        self.next_method_id += 1;
        debug_assert!(id != ABORT_METHOD_ID, "method table full");

        self.methods.insert(id, dispatcher);
        self.ids.insert(M::NAME, id);
        id
    }

    /// Register a closure for method `M`.
    ///
    /// Same as [`register`](Self::register), with closure argument types
    /// inferred from `M`.
    pub fn register_fn<M, F, Fut>(&mut self, handler: F) -> u16
    where
        M: Method,
        F: Fn(CallContext, M::Request, ResponseStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<M::Success, M::Error>> + Send + 'static,
    {
        self.register::<M, F>(handler)
    }

    pub fn get(&self, method_id: u16) -> Option<&dyn Dispatch> {
        self.methods.get(&method_id).map(|d| d.as_ref())
    }

    pub fn method_id(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    pub fn method_name(&self, method_id: u16) -> Option<&'static str> {
        self.get(method_id).map(|d| d.name())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Dispatch a call to the method registered under `method_id`.
    pub async fn dispatch(
        &self,
        method_id: u16,
        ctx: CallContext,
        protocol: &mut BinaryProtocol,
        stream: ResponseStream,
    ) -> Result<()> {
        let dispatcher = self
            .get(method_id)
            .ok_or(RpcError::MethodNotFound(method_id))?;

        dispatcher.call(ctx, protocol, stream).await
    }

    pub fn build_schema(&self) -> ServiceSchema {
        let methods = self
            .methods
            .iter()
            .map(|(&id, dispatcher)| {
                let sig = dispatcher.signature();
                let schema = MethodSchema {
                    id,
                    request: sig.request.to_string(),
                    success: sig.success.to_string(),
                    error: sig.error.to_string(),
                };
                (dispatcher.name().to_string(), schema)
            })
            .collect();

        ServiceSchema {
            service: self.service.clone(),
            abort_method_id: ABORT_METHOD_ID,
            methods,
        }
    }
}
