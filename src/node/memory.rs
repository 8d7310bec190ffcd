//! In-memory series store implementing [`NodeHandler`].
//!
//! Datapoints are kept in nanoseconds and converted to the request's
//! [`TimeType`](super::TimeType) on the way out.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::service::NodeHandler;
use super::types::{
    Datapoint, FetchTaggedIdResult, FetchTaggedRequest, FetchTaggedResult, NodeError,
    NodeHealthResult, Tag,
};
use crate::rpc::{CallContext, HandlerError, HandlerResult, ResponseStream};

/// One stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub id: String,
    pub tags: Vec<Tag>,
    /// Sorted by timestamp, in nanoseconds.
    pub datapoints: Vec<Datapoint>,
}

impl Series {
    pub fn new(id: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            id: id.into(),
            tags,
            datapoints: Vec::new(),
        }
    }

    /// Add a point; `timestamp` is in nanoseconds.
    pub fn with_point(mut self, timestamp: i64, value: f64) -> Self {
        self.push(timestamp, value);
        self
    }

    pub fn push(&mut self, timestamp: i64, value: f64) {
        let at = self
            .datapoints
            .partition_point(|dp| dp.timestamp <= timestamp);
        self.datapoints.insert(at, Datapoint { timestamp, value });
    }
}

type Namespace = BTreeMap<String, Series>;

/// Storage node backed by a map of namespaces.
#[derive(Debug)]
pub struct MemoryNode {
    namespaces: RwLock<HashMap<String, Namespace>>,
    bootstrapped: AtomicBool,
}

impl MemoryNode {
    /// An empty, bootstrapped node.
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::default(),
            bootstrapped: AtomicBool::new(true),
        }
    }

    /// Create `namespace` if it does not exist yet.
    pub fn create_namespace(&self, namespace: &str) {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default();
    }

    /// Insert or replace a series, creating the namespace as needed.
    pub fn insert(&self, namespace: &str, series: Series) {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(series.id.clone(), series);
    }

    pub fn set_bootstrapped(&self, bootstrapped: bool) {
        self.bootstrapped.store(bootstrapped, Ordering::Release);
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Series in `namespace` selected by `req`, in ID order.
    fn select(&self, req: &FetchTaggedRequest) -> Result<Vec<Series>, NodeError> {
        let namespaces = self.namespaces.read();
        let namespace = namespaces.get(&req.namespace).ok_or_else(|| {
            NodeError::not_found(format!("namespace {} not found", req.namespace))
        })?;

        let by_id = !req.series_ids.is_empty();
        let selected = namespace
            .values()
            .filter(|s| !by_id || req.series_ids.iter().any(|id| *id == s.id))
            .filter(|s| req.matchers.iter().all(|m| m.matches(&s.tags)))
            .cloned()
            .collect();

        Ok(selected)
    }
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for MemoryNode {
    async fn fetch_tagged(
        &self,
        ctx: CallContext,
        req: FetchTaggedRequest,
        _stream: ResponseStream,
    ) -> HandlerResult<FetchTaggedResult, NodeError> {
        if req.range_start > req.range_end {
            return Err(NodeError::bad_request(format!(
                "range start {} is after range end {}",
                req.range_start, req.range_end
            ))
            .into());
        }

        let mut series = self.select(&req)?;

        let mut exhaustive = true;
        if let Some(limit) = req.series_limit {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            if series.len() > limit {
                if req.require_exhaustive {
                    return Err(NodeError::resource_exhausted(format!(
                        "query matched {} series, limit is {}",
                        series.len(),
                        limit
                    ))
                    .into());
                }
                series.truncate(limit);
                exhaustive = false;
            }
        }

        let unit = req.range_type;
        let start = unit.to_nanos(req.range_start);
        let end = unit.to_nanos(req.range_end);

        let mut elements = Vec::with_capacity(series.len());
        for s in series {
            if let Some(err) = ctx.err() {
                return Err(HandlerError::other(err));
            }

            let datapoints = if req.fetch_data {
                s.datapoints
                    .iter()
                    .filter(|dp| dp.timestamp >= start && dp.timestamp < end)
                    .map(|dp| Datapoint {
                        timestamp: unit.from_nanos(dp.timestamp),
                        value: dp.value,
                    })
                    .collect()
            } else {
                Vec::new()
            };

            elements.push(FetchTaggedIdResult {
                id: s.id,
                namespace: req.namespace.clone(),
                tags: s.tags,
                datapoints,
            });
        }

        tracing::debug!(
            namespace = %req.namespace,
            series = elements.len(),
            exhaustive,
            "fetchTagged served"
        );

        Ok(FetchTaggedResult {
            elements,
            exhaustive,
        })
    }

    async fn health(&self, _ctx: CallContext) -> HandlerResult<NodeHealthResult, NodeError> {
        let bootstrapped = self.bootstrapped.load(Ordering::Acquire);
        Ok(NodeHealthResult {
            ok: true,
            status: if bootstrapped { "up" } else { "bootstrapping" }.to_string(),
            bootstrapped,
        })
    }
}
