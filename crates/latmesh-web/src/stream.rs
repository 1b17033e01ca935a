//! `/api/stream`: one snapshot frame up front, another per graph version,
//! heartbeat comments while idle, `event: shutdown` when the bus closes.

use crate::handlers::ApiState;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream};
use tracing::debug;

enum Phase {
    Start,
    Waiting(u64),
    Done,
}

pub async fn handle_stream(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    Sse::new(graph_events(state))
}

pub fn graph_events(state: ApiState) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold((state, Phase::Start), |(state, phase)| async move {
        match phase {
            Phase::Start => {
                let version = state.broadcast.version();
                let frame = snapshot_event(&state, version).await;
                Some((frame, (state, Phase::Waiting(version))))
            }
            Phase::Waiting(version) => {
                let next =
                    tokio::time::timeout(state.heartbeat, state.broadcast.wait_for(version)).await;
                match next {
                    Err(_) => {
                        let frame = Ok(Event::default().comment("heartbeat"));
                        Some((frame, (state, Phase::Waiting(version))))
                    }
                    Ok(None) => {
                        debug!(version, "stream closing");
                        let frame = Ok(Event::default().event("shutdown"));
                        Some((frame, (state, Phase::Done)))
                    }
                    Ok(Some(next)) => {
                        let frame = snapshot_event(&state, next).await;
                        Some((frame, (state, Phase::Waiting(next))))
                    }
                }
            }
            Phase::Done => None,
        }
    })
}

async fn snapshot_event(state: &ApiState, version: u64) -> Result<Event, axum::Error> {
    let snapshot = state.snapshot(version).await;
    Event::default().json_data(snapshot)
}
