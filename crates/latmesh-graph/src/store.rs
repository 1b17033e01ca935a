use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use latmesh_model::{
    GraphAttrs, GraphSnapshot, GraphStats, Hop, LinkRecord, LiveStats, NodeLinkFile, NodeRecord,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Floor applied to every edge weight derived from an RTT delta.
pub const MIN_EDGE_WEIGHT: f64 = 0.1;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttrs {
    /// Smallest RTT ever observed, in milliseconds.
    pub rtt: Option<f64>,
    /// Latest observation time (UTC).
    pub last_seen: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeAttrs {
    pub weight: Option<f64>,
}

/// Undirected latency graph keyed by address.
///
/// Mutation is single-writer; callers sharing a store across tasks wrap it
/// in a mutex and take the same lock for snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    nodes: BTreeMap<String, NodeAttrs>,
    edges: BTreeMap<(String, String), EdgeAttrs>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.nodes.contains_key(addr)
    }

    pub fn node(&self, addr: &str) -> Option<&NodeAttrs> {
        self.nodes.get(addr)
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&EdgeAttrs> {
        edge_key(a, b).and_then(|key| self.edges.get(&key))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeAttrs)> {
        self.nodes.iter().map(|(id, attrs)| (id.as_str(), attrs))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeAttrs)> {
        self.edges
            .iter()
            .map(|((a, b), attrs)| (a.as_str(), b.as_str(), attrs))
    }

    pub fn neighbors(&self, addr: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(addr)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn degree(&self, addr: &str) -> usize {
        self.adjacency.get(addr).map_or(0, BTreeSet::len)
    }

    /// Record one traceroute result observed now.
    pub fn observe(&mut self, hops: &[Hop]) {
        self.observe_at(hops, Utc::now().naive_utc());
    }

    /// Record one traceroute result observed at `at`.
    ///
    /// Node RTTs only ever decrease and `last_seen` only ever advances. An
    /// edge takes its weight from the pair that first created it and keeps it.
    pub fn observe_at(&mut self, hops: &[Hop], at: NaiveDateTime) {
        // Persisted timestamps carry whole seconds; keep memory and disk equal.
        let at = at.with_nanosecond(0).unwrap_or(at);
        for (i, hop) in hops.iter().enumerate() {
            let node = self.nodes.entry(hop.addr.clone()).or_default();
            node.rtt = Some(node.rtt.map_or(hop.rtt_ms, |rtt| rtt.min(hop.rtt_ms)));
            node.last_seen = Some(node.last_seen.map_or(at, |seen| seen.max(at)));

            if i == 0 {
                continue;
            }
            let prev = &hops[i - 1];
            let Some(key) = edge_key(&prev.addr, &hop.addr) else {
                continue;
            };
            if !self.edges.contains_key(&key) {
                let weight = (hop.rtt_ms - prev.rtt_ms).max(MIN_EDGE_WEIGHT);
                self.insert_edge(key, EdgeAttrs {
                    weight: Some(weight),
                });
            }
        }
    }

    /// Fold `other` into `self`: min RTT, max `last_seen`, min edge weight.
    pub fn merge(&mut self, other: &GraphStore) {
        for (id, incoming) in &other.nodes {
            let node = self.nodes.entry(id.clone()).or_default();
            node.rtt = min_present(node.rtt, incoming.rtt);
            node.last_seen = match (node.last_seen, incoming.last_seen) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        for (key, incoming) in &other.edges {
            match self.edges.get_mut(key) {
                Some(existing) => {
                    existing.weight = min_present(existing.weight, incoming.weight);
                }
                None => self.insert_edge(key.clone(), incoming.clone()),
            }
        }
    }

    /// Remove every node matching `predicate` together with its incident
    /// edges. Returns the number of nodes removed.
    pub fn prune<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&str, &NodeAttrs) -> bool,
    {
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|(id, attrs)| predicate(id, attrs))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &doomed {
            self.nodes.remove(id);
            if let Some(neighbors) = self.adjacency.remove(id) {
                for other in neighbors {
                    if let Some(key) = edge_key(id, &other) {
                        self.edges.remove(&key);
                    }
                    if let Some(set) = self.adjacency.get_mut(&other) {
                        set.remove(id);
                        if set.is_empty() {
                            self.adjacency.remove(&other);
                        }
                    }
                }
            }
        }

        doomed.len()
    }

    pub fn connected_components(&self) -> usize {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut components = 0;

        for start in self.nodes.keys() {
            if !visited.insert(start.as_str()) {
                continue;
            }
            components += 1;
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(node) = queue.pop_front() {
                for neighbor in self.neighbors(node) {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        components
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            components: self.connected_components(),
            avg_degree: self.avg_degree(),
            avg_latency: self.avg_latency(),
        }
    }

    pub fn live_stats(&self, version: u64) -> LiveStats {
        LiveStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            avg_degree: self.avg_degree(),
            avg_latency: self.avg_latency(),
            version,
        }
    }

    /// Consistent copy of nodes and links tagged with a broadcast version.
    pub fn snapshot(&self, version: u64) -> GraphSnapshot {
        let (nodes, links) = self.records();
        GraphSnapshot {
            version,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            nodes,
            links,
        }
    }

    pub fn to_node_link(&self) -> NodeLinkFile {
        let (nodes, links) = self.records();
        NodeLinkFile {
            directed: false,
            multigraph: false,
            graph: GraphAttrs,
            nodes,
            links,
        }
    }

    pub fn from_node_link(file: &NodeLinkFile) -> Self {
        let mut graph = GraphStore::new();
        for record in &file.nodes {
            let attrs = NodeAttrs {
                rtt: record.rtt,
                last_seen: record.last_seen.as_deref().and_then(parse_timestamp),
            };
            graph.nodes.insert(record.id.clone(), attrs);
        }
        for link in &file.links {
            let Some(key) = edge_key(&link.source, &link.target) else {
                continue;
            };
            graph.nodes.entry(link.source.clone()).or_default();
            graph.nodes.entry(link.target.clone()).or_default();
            graph.insert_edge(key, EdgeAttrs {
                weight: link.weight,
            });
        }
        graph
    }

    fn records(&self) -> (Vec<NodeRecord>, Vec<LinkRecord>) {
        let nodes = self
            .nodes
            .iter()
            .map(|(id, attrs)| NodeRecord {
                id: id.clone(),
                rtt: attrs.rtt,
                last_seen: attrs.last_seen.map(format_timestamp),
            })
            .collect();
        let links = self
            .edges
            .iter()
            .map(|((source, target), attrs)| LinkRecord {
                source: source.clone(),
                target: target.clone(),
                weight: attrs.weight,
            })
            .collect();
        (nodes, links)
    }

    fn insert_edge(&mut self, key: (String, String), attrs: EdgeAttrs) {
        self.adjacency
            .entry(key.0.clone())
            .or_default()
            .insert(key.1.clone());
        self.adjacency
            .entry(key.1.clone())
            .or_default()
            .insert(key.0.clone());
        self.edges.insert(key, attrs);
    }

    fn avg_degree(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let total: usize = self.nodes.keys().map(|id| self.degree(id)).sum();
        total as f64 / self.nodes.len() as f64
    }

    fn avg_latency(&self) -> f64 {
        let latencies: Vec<f64> = self.nodes.values().filter_map(|attrs| attrs.rtt).collect();
        if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        }
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts naive ISO-8601 (with or without fractional seconds) and RFC 3339.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|at| at.naive_utc())
        })
}

fn edge_key(a: &str, b: &str) -> Option<(String, String)> {
    match a.cmp(b) {
        std::cmp::Ordering::Less => Some((a.to_string(), b.to_string())),
        std::cmp::Ordering::Greater => Some((b.to_string(), a.to_string())),
        std::cmp::Ordering::Equal => None,
    }
}

fn min_present(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
