//! # nodewire
//!
//! Typed RPC method dispatch for a storage node.
//!
//! A call arrives as one framed request, gets decoded into a typed request
//! and is handed to application logic under a [`CallContext`] carrying its
//! deadline, cancellation and trace metadata. Exactly one of a success
//! payload or a typed error goes back to the caller. Anything else
//! (malformed requests, unclassified handler errors, expired deadlines) is a
//! transport fault.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): 11-byte header, MessagePack envelopes
//! - **Dispatch** ([`rpc`]): method table, generic dispatcher, call context
//! - **Node** ([`node`]): the `fetchTagged` / `health` methods
//! - **Server** ([`server`]): connections, concurrency limit, abort frames
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodewire::node::{node_registry, MemoryNode};
//! use nodewire::NodeServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = NodeServer::builder(node_registry(Arc::new(MemoryNode::new()))).build();
//!     let listener = nodewire::transport::Listener::bind(&"tcp://127.0.0.1:9000".parse()?).await?;
//!     server.serve(listener).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod glue;
pub mod node;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod telemetry;
pub mod transport;
pub mod writer;

pub use error::{RpcError, Result};
pub use rpc::{CallContext, HandlerError, Method, MethodRegistry, ResultEnvelope};
pub use server::{NodeServer, NodeServerBuilder};
