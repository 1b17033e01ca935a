use latmesh_model::Hop;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Probe(String),
    /// Tells the worker that dequeues it to exit.
    Stop,
}

#[derive(Debug, Default)]
struct FrontierState {
    seen: HashSet<String>,
    pending: HashSet<String>,
    queue: VecDeque<WorkItem>,
    unfinished: usize,
}

/// Work queue plus the seen/pending bookkeeping that keeps it bounded.
///
/// `seen` holds every address discovered this session; `pending` holds the
/// addresses currently queued. Both are updated under the same lock as the
/// queue, so an address is enqueued at most once while it is pending.
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    ready: Notify,
}

impl Frontier {
    /// Start a frontier that already knows `known` (e.g. nodes of a loaded
    /// graph).
    pub fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                seen: known.into_iter().collect(),
                ..FrontierState::default()
            }),
            ready: Notify::new(),
        }
    }

    /// Queue the initial pool. Addresses already pending are skipped.
    pub fn seed(&self, pool: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        {
            let mut state = self.state.lock();
            for addr in pool {
                if state.pending.insert(addr.clone()) {
                    state.queue.push_back(WorkItem::Probe(addr));
                    state.unfinished += 1;
                    added += 1;
                }
            }
        }
        if added > 0 {
            self.ready.notify_one();
        }
        added
    }

    pub fn push(&self, item: WorkItem) {
        {
            let mut state = self.state.lock();
            if let WorkItem::Probe(addr) = &item {
                state.pending.insert(addr.clone());
            }
            state.queue.push_back(item);
            state.unfinished += 1;
        }
        self.ready.notify_one();
    }

    /// Wait up to `wait` for the next item. `None` on timeout.
    ///
    /// Cancel safe: an item is only removed from the queue when returned.
    pub async fn next(&self, wait: Duration) -> Option<WorkItem> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (item, more) = {
                let mut state = self.state.lock();
                let item = state.queue.pop_front();
                (item, !state.queue.is_empty())
            };
            if let Some(item) = item {
                // Pass the wakeup on so idle consumers drain the backlog.
                if more {
                    self.ready.notify_one();
                }
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Queue hop addresses that have not been seen yet. An address that was
    /// seen before and is not pending is requeued when `revisit` says so.
    /// Returns how many addresses were queued.
    pub fn expand(&self, hops: &[Hop], mut revisit: impl FnMut() -> bool) -> usize {
        let mut queued = 0;
        {
            let mut state = self.state.lock();
            for hop in hops {
                let addr = &hop.addr;
                let fresh = state.seen.insert(addr.clone());
                if state.pending.contains(addr) {
                    continue;
                }
                if fresh || revisit() {
                    state.pending.insert(addr.clone());
                    state.queue.push_back(WorkItem::Probe(addr.clone()));
                    state.unfinished += 1;
                    queued += 1;
                }
            }
        }
        if queued > 0 {
            self.ready.notify_one();
        }
        queued
    }

    /// Mark `addr` as no longer pending and acknowledge its queue item.
    pub fn complete(&self, addr: &str) {
        let mut state = self.state.lock();
        state.pending.remove(addr);
        state.unfinished = state.unfinished.saturating_sub(1);
    }

    /// Acknowledge an item that carried no address (a stop marker).
    pub fn ack(&self) {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items dequeued or queued but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.state.lock().unfinished
    }

    pub fn seen_count(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn is_pending(&self, addr: &str) -> bool {
        self.state.lock().pending.contains(addr)
    }
}
