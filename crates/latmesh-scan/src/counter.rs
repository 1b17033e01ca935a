use parking_lot::Mutex;
use std::sync::Arc;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Counts after one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub since_last_draw: u64,
    pub total: u64,
}

#[derive(Default)]
struct CounterState {
    tally: Tally,
    subscriber: Option<Callback>,
}

/// Successful-trace counter shared by the workers and the redraw scheduler.
#[derive(Default)]
pub struct SuccessCounter {
    state: Mutex<CounterState>,
}

impl SuccessCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one success and wake the subscriber, if any.
    pub fn increment_and_get(&self) -> Tally {
        let (tally, subscriber) = {
            let mut state = self.state.lock();
            state.tally.since_last_draw += 1;
            state.tally.total += 1;
            (state.tally, state.subscriber.clone())
        };
        if let Some(callback) = subscriber {
            callback();
        }
        tally
    }

    pub fn reset(&self) {
        self.state.lock().tally.since_last_draw = 0;
    }

    /// Reset and return the pending count if it reached `threshold`.
    pub fn take_if_at_least(&self, threshold: u64) -> Option<u64> {
        let mut state = self.state.lock();
        let pending = state.tally.since_last_draw;
        if pending >= threshold {
            state.tally.since_last_draw = 0;
            Some(pending)
        } else {
            None
        }
    }

    /// Replace the callback run after every increment.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state.lock().subscriber = Some(Arc::new(callback));
    }

    pub fn unsubscribe(&self) {
        self.state.lock().subscriber = None;
    }

    pub fn get(&self) -> Tally {
        self.state.lock().tally
    }
}

impl std::fmt::Debug for SuccessCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessCounter")
            .field("tally", &self.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn increments_notify_the_subscriber() {
        let counter = SuccessCounter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            counter.subscribe(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        counter.increment_and_get();
        let tally = counter.increment_and_get();
        assert_eq!(tally, Tally { since_last_draw: 2, total: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        counter.reset();
        assert_eq!(counter.get(), Tally { since_last_draw: 0, total: 2 });

        counter.unsubscribe();
        counter.increment_and_get();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn take_only_fires_at_threshold() {
        let counter = SuccessCounter::new();
        counter.increment_and_get();
        assert_eq!(counter.take_if_at_least(2), None);
        counter.increment_and_get();
        assert_eq!(counter.take_if_at_least(2), Some(2));
        assert_eq!(counter.get().since_last_draw, 0);
        assert_eq!(counter.get().total, 2);
    }
}
