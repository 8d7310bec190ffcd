//! Storage node RPC service.
//!
//! Defines the node's methods ([`FetchTagged`], [`Health`]), their wire
//! types, the [`NodeHandler`] capability and an in-memory implementation.

mod memory;
mod service;
mod types;

pub use memory::{MemoryNode, Series};
pub use service::{node_registry, register_node_service, FetchTagged, Health, NodeHandler};
pub use types::{
    Datapoint, ErrorKind, FetchTaggedIdResult, FetchTaggedRequest, FetchTaggedResult,
    MatchKind, NodeError, NodeHealthResult, Tag, TagMatcher, TimeType, FLAG_RESOURCE_EXHAUSTED,
};
