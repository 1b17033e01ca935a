//! Concurrent discovery engine: address pool, frontier, traceroute workers,
//! redraw scheduling, change broadcast and scan lifecycle.

pub mod broadcast;
pub mod config;
pub mod counter;
pub mod frontier;
pub mod pool;
pub mod redraw;
pub mod scan;
pub mod signals;
pub mod stop;
pub mod worker;

pub use broadcast::{forward_updates, GraphBroadcast, Update, UpdatePipe};
pub use config::{parse_duration, ConfigError, ScanConfig, UpdateMode, DEFAULT_SEEDS};
pub use counter::{SuccessCounter, Tally};
pub use frontier::{Frontier, WorkItem};
pub use pool::generate_pool;
pub use redraw::{run_redraw, Canvas, NullCanvas};
pub use scan::{ScanError, ScanOutcome, Scanner};
pub use signals::SignalGuard;
pub use stop::StopSignal;
pub use worker::{run_worker, Pacing, WorkerContext, WorkerReport};

use latmesh_graph::GraphStore;
use std::sync::Arc;

/// The topology graph shared between workers, the redraw task and the API.
pub type SharedGraph = Arc<tokio::sync::Mutex<GraphStore>>;

pub fn shared_graph(graph: GraphStore) -> SharedGraph {
    Arc::new(tokio::sync::Mutex::new(graph))
}
