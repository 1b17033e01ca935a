//! Shared data structures for LatencyMesh.

use serde::{Deserialize, Serialize};

pub use graph_attrs::GraphAttrs;

/// One responding router on a traceroute path, nearest-first within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hop {
    pub addr: String,
    pub rtt_ms: f64,
}

impl Hop {
    pub fn new(addr: impl Into<String>, rtt_ms: f64) -> Self {
        Self {
            addr: addr.into(),
            rtt_ms,
        }
    }
}

/// Persisted node-link document. Layout matches the `networkx` node-link
/// format so maps written by older tooling load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeLinkFile {
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub multigraph: bool,
    #[serde(default)]
    pub graph: GraphAttrs,
    pub nodes: Vec<NodeRecord>,
    #[serde(alias = "edges")]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Body of `GET /api/graph` and of every `data:` frame on the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub version: u64,
    pub generated_at: String,
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

/// Offline summary printed by `latmesh stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
    pub avg_degree: f64,
    pub avg_latency: f64,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveStats {
    pub nodes: usize,
    pub edges: usize,
    pub avg_degree: f64,
    pub avg_latency: f64,
    pub version: u64,
}

mod graph_attrs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// The node-link `graph` attribute map. LatencyMesh never sets graph
    /// level attributes, so whatever is read is discarded and `{}` is written.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct GraphAttrs;

    impl Serialize for GraphAttrs {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeMap;
            serializer.serialize_map(Some(0))?.end()
        }
    }

    impl<'de> Deserialize<'de> for GraphAttrs {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            serde::de::IgnoredAny::deserialize(deserializer)?;
            Ok(GraphAttrs)
        }
    }
}
