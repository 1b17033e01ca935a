//! Change notification for streaming subscribers.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Notify};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
struct BusState {
    version: u64,
    closed: bool,
}

/// Monotonic graph version with wake-all semantics.
///
/// `notify` bumps the version; `wait_for` returns as soon as the version
/// differs from the caller's, or `None` once the bus is closed.
#[derive(Debug, Clone)]
pub struct GraphBroadcast {
    tx: Arc<watch::Sender<BusState>>,
}

impl Default for GraphBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBroadcast {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BusState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Bump the version and wake every waiter. Returns the new version.
    pub fn notify(&self) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|state| {
            state.version += 1;
            version = state.version;
        });
        version
    }

    pub async fn wait_for(&self, last_version: u64) -> Option<u64> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| state.closed || state.version != last_version)
            .await
            .ok()
            .map(|state| *state)?;
        if state.closed {
            None
        } else {
            Some(state.version)
        }
    }

    /// Close the bus for good. Idempotent.
    pub fn close(&self) {
        self.tx.send_if_modified(|state| {
            let changed = !state.closed;
            state.closed = true;
            changed
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    /// The graph changed; seconds since the Unix epoch.
    Graph { timestamp: f64 },
    Shutdown,
}

impl Update {
    pub fn graph_now() -> Self {
        Update::Graph {
            timestamp: now_unix(),
        }
    }
}

#[derive(Debug)]
struct PipeInner {
    queue: Mutex<VecDeque<Update>>,
    capacity: usize,
    ready: Notify,
}

/// Bounded hand-off from the scan to the live service. Publishing never
/// blocks: when full, the oldest queued update is dropped.
#[derive(Debug, Clone)]
pub struct UpdatePipe {
    inner: Arc<PipeInner>,
}

impl Default for UpdatePipe {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl UpdatePipe {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PipeInner {
                queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                capacity: capacity.max(1),
                ready: Notify::new(),
            }),
        }
    }

    pub fn publish(&self, update: Update) {
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.capacity {
                if let Some(dropped) = queue.pop_front() {
                    debug!(?dropped, "update pipe full, dropped oldest");
                }
            }
            queue.push_back(update);
        }
        self.inner.ready.notify_one();
    }

    pub async fn recv(&self) -> Update {
        loop {
            let notified = self.inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(update) = self.inner.queue.lock().pop_front() {
                return update;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Relay pipe updates onto the broadcast until a shutdown arrives.
pub async fn forward_updates(pipe: UpdatePipe, broadcast: GraphBroadcast) {
    loop {
        match pipe.recv().await {
            Update::Graph { .. } => {
                broadcast.notify();
            }
            Update::Shutdown => {
                broadcast.close();
                break;
            }
        }
    }
    debug!(version = broadcast.version(), "update forwarder finished");
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
