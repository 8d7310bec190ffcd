//! Request, result and error types of the node service.

use serde::{Deserialize, Serialize};

use crate::rpc::KnownError;

/// Unit of the range bounds in a fetch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeType {
    #[default]
    Seconds,
    Millis,
    Nanos,
}

impl TimeType {
    fn nanos_per_unit(self) -> i64 {
        match self {
            TimeType::Seconds => 1_000_000_000,
            TimeType::Millis => 1_000_000,
            TimeType::Nanos => 1,
        }
    }

    /// Convert a value in this unit to nanoseconds, saturating on overflow.
    pub fn to_nanos(self, value: i64) -> i64 {
        value.saturating_mul(self.nanos_per_unit())
    }

    /// Convert nanoseconds to this unit, truncating.
    pub fn from_nanos(self, nanos: i64) -> i64 {
        nanos / self.nanos_per_unit()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    #[default]
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatcher {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub kind: MatchKind,
}

impl TagMatcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: MatchKind::Equal,
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::NotEqual,
            ..Self::equal(name, value)
        }
    }

    pub fn matches(&self, tags: &[Tag]) -> bool {
        let present = tags
            .iter()
            .any(|t| t.name == self.name && t.value == self.value);
        match self.kind {
            MatchKind::Equal => present,
            MatchKind::NotEqual => !present,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Arguments of `fetchTagged`.
///
/// A series is selected when its ID is in `series_ids` (or `series_ids` is
/// empty) and every matcher holds. The range is `[range_start, range_end)`
/// in `range_type` units.
///
/// `namespace`, the range bounds and `fetch_data` are required on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchTaggedRequest {
    pub namespace: String,
    #[serde(default)]
    pub series_ids: Vec<String>,
    #[serde(default)]
    pub matchers: Vec<TagMatcher>,
    pub range_start: i64,
    pub range_end: i64,
    #[serde(default)]
    pub range_type: TimeType,
    pub fetch_data: bool,
    #[serde(default)]
    pub series_limit: Option<u64>,
    #[serde(default)]
    pub require_exhaustive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTaggedIdResult {
    pub id: String,
    pub namespace: String,
    pub tags: Vec<Tag>,
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchTaggedResult {
    pub elements: Vec<FetchTaggedIdResult>,
    /// False when `series_limit` cut the result short.
    pub exhaustive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealthResult {
    pub ok: bool,
    pub status: String,
    pub bootstrapped: bool,
}

/// `Unset` is the kind of the vacant error only; no constructor produces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[default]
    Unset,
    Internal,
    BadRequest,
    NotFound,
    ResourceExhausted,
}

/// Error flag: the request hit a resource limit.
pub const FLAG_RESOURCE_EXHAUSTED: u64 = 1;

/// Typed error of every node method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub flags: u64,
}

impl NodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            flags: 0,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self {
            flags: FLAG_RESOURCE_EXHAUSTED,
            ..Self::new(ErrorKind::ResourceExhausted, message)
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        self.flags & FLAG_RESOURCE_EXHAUSTED != 0
    }
}

impl KnownError for NodeError {}
