//! Offline operations on saved graphs, one per CLI subcommand.

use crate::io::{
    atomic_write, export_csv, export_gexf, load_existing_graph, resolve_graph_path, save_graph,
    ExportFormat, GraphIoError,
};
use crate::store::GraphStore;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use latmesh_model::GraphStats;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Nodes matching any set criterion are removed.
#[derive(Debug, Clone, Default)]
pub struct PruneCriteria {
    /// Drop nodes not seen within this window (and nodes never stamped).
    pub older_than: Option<Duration>,
    /// Drop nodes whose RTT is below this many milliseconds (or unknown).
    pub min_latency: Option<f64>,
}

impl PruneCriteria {
    pub fn cutoff(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.older_than.map(|window| {
            ChronoDuration::from_std(window)
                .ok()
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(NaiveDateTime::MIN)
        })
    }

    pub fn apply(&self, graph: &mut GraphStore, now: NaiveDateTime) -> usize {
        let cutoff = self.cutoff(now);
        graph.prune(|_, attrs| {
            if let Some(min) = self.min_latency {
                if attrs.rtt.map_or(true, |rtt| rtt < min) {
                    return true;
                }
            }
            match cutoff {
                Some(cutoff) => attrs.last_seen.map_or(true, |seen| seen < cutoff),
                None => false,
            }
        })
    }
}

pub fn export_graph(
    graph_path: &Path,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<PathBuf, GraphIoError> {
    let (resolved, graph) = load_existing_graph(graph_path)?;
    let target = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| resolved.with_extension(format.extension()));

    let mut buf = Vec::new();
    let written = match format {
        ExportFormat::Gexf => export_gexf(&graph, &mut buf),
        ExportFormat::Csv => export_csv(&graph, &mut buf),
    };
    written.map_err(|source| GraphIoError::Io {
        path: target.clone(),
        source,
    })?;
    atomic_write(&target, &buf)?;
    Ok(target)
}

pub fn graph_stats(graph_path: &Path) -> Result<GraphStats, GraphIoError> {
    let (_, graph) = load_existing_graph(graph_path)?;
    Ok(graph.stats())
}

/// Prune a saved graph, writing to `output` or back over the input.
pub fn prune_graph(
    graph_path: &Path,
    criteria: &PruneCriteria,
    output: Option<&Path>,
) -> Result<PathBuf, GraphIoError> {
    let (resolved, mut graph) = load_existing_graph(graph_path)?;
    let removed = criteria.apply(&mut graph, Utc::now().naive_utc());
    tracing::info!(removed, remaining = graph.node_count(), "pruned graph");

    let target = output.unwrap_or(resolved.as_path());
    save_graph(&graph, target)?;
    resolve_graph_path(target)
}

/// Combine saved graphs into one; every input must exist.
pub fn merge_graphs(graphs: &[PathBuf], output: &Path) -> Result<PathBuf, GraphIoError> {
    let mut merged = GraphStore::new();
    for path in graphs {
        let (_, graph) = load_existing_graph(path)?;
        merged.merge(&graph);
    }
    save_graph(&merged, output)?;
    resolve_graph_path(output)
}
