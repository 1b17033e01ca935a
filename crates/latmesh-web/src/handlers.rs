use axum::extract::State;
use axum::Json;
use latmesh_model::{GraphSnapshot, LiveStats};
use latmesh_scan::{GraphBroadcast, SharedGraph};
use std::time::Duration;

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct ApiState {
    pub graph: SharedGraph,
    pub broadcast: GraphBroadcast,
    /// Idle interval after which the stream emits a keep-alive comment.
    pub heartbeat: Duration,
}

impl ApiState {
    pub fn new(graph: SharedGraph, broadcast: GraphBroadcast) -> Self {
        Self {
            graph,
            broadcast,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub async fn snapshot(&self, version: u64) -> GraphSnapshot {
        self.graph.lock().await.snapshot(version)
    }
}

pub async fn handle_graph(State(state): State<ApiState>) -> Json<GraphSnapshot> {
    let version = state.broadcast.version();
    Json(state.snapshot(version).await)
}

pub async fn handle_stats(State(state): State<ApiState>) -> Json<LiveStats> {
    let version = state.broadcast.version();
    Json(state.graph.lock().await.live_stats(version))
}
