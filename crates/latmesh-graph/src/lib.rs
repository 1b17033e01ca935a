//! Topology graph storage, persistence and layout.

pub mod io;
pub mod layout;
pub mod ops;
pub mod store;

pub use io::{
    export_csv, export_gexf, load_existing_graph, load_graph, resolve_graph_path, save_graph, ExportFormat,
    GraphIoError,
};
pub use layout::{compute_positions, Layout, Positions};
pub use ops::{export_graph, graph_stats, merge_graphs, prune_graph, PruneCriteria};
pub use store::{EdgeAttrs, GraphStore, NodeAttrs, MIN_EDGE_WEIGHT};
