use chrono::NaiveDate;
use latmesh_graph::{
    export_graph, graph_stats, load_graph, merge_graphs, prune_graph, save_graph, ExportFormat,
    GraphIoError, GraphStore, PruneCriteria,
};
use latmesh_model::Hop;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn hop(addr: &str, rtt: f64) -> Hop {
    Hop::new(addr, rtt)
}

fn sample_graph() -> GraphStore {
    let mut graph = GraphStore::new();
    graph.observe(&[hop("10.0.0.1", 1.0), hop("10.0.0.2", 3.0), hop("10.0.0.3", 8.0)]);
    graph.observe(&[hop("10.0.0.1", 1.2), hop("10.0.0.4", 4.2)]);
    graph
}

#[test]
fn save_then_load_restores_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("internet_map");
    let graph = sample_graph();

    let json_path = save_graph(&graph, &base).unwrap();
    assert_eq!(json_path, dir.path().join("internet_map.json"));
    assert!(dir.path().join("internet_map.gexf").exists());

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(raw["directed"], serde_json::json!(false));
    assert_eq!(raw["links"].as_array().unwrap().len(), 3);

    let loaded = load_graph(&base).unwrap();
    assert_eq!(loaded, graph);
}

#[test]
fn missing_graph_loads_empty_but_is_not_found_for_commands() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("nothing_here");

    assert!(load_graph(&base).unwrap().is_empty());
    assert!(matches!(graph_stats(&base), Err(GraphIoError::NotFound(_))));
}

#[test]
fn directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_graph(dir.path()),
        Err(GraphIoError::IsDirectory(_))
    ));
}

#[test]
fn export_csv_lists_every_edge() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("map");
    save_graph(&sample_graph(), &base).unwrap();

    let target = export_graph(&base, ExportFormat::Csv, None).unwrap();
    assert_eq!(target, dir.path().join("map.csv"));

    let csv = fs::read_to_string(target).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("source,target,weight"));
    assert!(csv.contains("10.0.0.1,10.0.0.2,2"));
    assert_eq!(lines.count(), 3);
}

#[test]
fn stats_match_saved_graph() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("map");
    save_graph(&sample_graph(), &base).unwrap();

    let stats = graph_stats(&base).unwrap();
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.edges, 3);
    assert_eq!(stats.components, 1);
    assert!((stats.avg_degree - 1.5).abs() < 1e-9);
}

#[test]
fn prune_removes_fast_and_stale_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("map");

    let old = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut graph = GraphStore::new();
    graph.observe_at(&[hop("10.0.0.9", 50.0)], old);
    graph.observe(&[hop("10.0.0.1", 0.5), hop("10.0.0.2", 20.0)]);
    save_graph(&graph, &base).unwrap();

    let criteria = PruneCriteria {
        older_than: Some(Duration::from_secs(24 * 3600)),
        min_latency: Some(1.0),
    };
    let out = dir.path().join("pruned");
    let written = prune_graph(&base, &criteria, Some(&out)).unwrap();
    assert_eq!(written, dir.path().join("pruned.json"));

    let pruned = load_graph(&out).unwrap();
    let ids: Vec<&str> = pruned.nodes().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["10.0.0.2"]);
    assert_eq!(pruned.edge_count(), 0);
}

#[test]
fn merge_combines_saved_graphs() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");

    let mut left = GraphStore::new();
    left.observe(&[hop("10.0.0.1", 5.0), hop("10.0.0.2", 9.0)]);
    save_graph(&left, &a).unwrap();
    let mut right = GraphStore::new();
    right.observe(&[hop("10.0.0.1", 2.0), hop("10.0.0.2", 3.0)]);
    save_graph(&right, &b).unwrap();

    let out = dir.path().join("merged.json");
    let inputs: Vec<PathBuf> = vec![a, b];
    let written = merge_graphs(&inputs, &out).unwrap();
    assert_eq!(written, out);

    let merged = load_graph(&out).unwrap();
    assert_eq!(merged.node("10.0.0.1").unwrap().rtt, Some(2.0));
    assert_eq!(merged.edge("10.0.0.1", "10.0.0.2").unwrap().weight, Some(1.0));

    let missing = vec![dir.path().join("nope")];
    assert!(matches!(
        merge_graphs(&missing, &out),
        Err(GraphIoError::NotFound(_))
    ));
}
