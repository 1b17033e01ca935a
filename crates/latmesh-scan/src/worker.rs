use crate::broadcast::{Update, UpdatePipe};
use crate::counter::SuccessCounter;
use crate::frontier::{Frontier, WorkItem};
use crate::stop::StopSignal;
use crate::SharedGraph;
use latmesh_model::Hop;
use latmesh_trace::{TraceSettings, Tracer};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-worker spacing between probes, jittered by ±20%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    delay: Duration,
}

impl Pacing {
    pub fn from_pps(pps: f64) -> Self {
        let pps = if pps.is_finite() { pps.max(0.001) } else { 1.0 };
        Self {
            delay: Duration::from_secs_f64(1.0 / pps),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn jittered(&self) -> Duration {
        self.delay.mul_f64(rand::thread_rng().gen_range(0.8..1.2))
    }
}

pub struct WorkerContext<T> {
    pub id: usize,
    pub tracer: Arc<T>,
    pub settings: TraceSettings,
    pub graph: SharedGraph,
    pub frontier: Arc<Frontier>,
    pub counter: Arc<SuccessCounter>,
    pub stop: StopSignal,
    pub pacing: Pacing,
    pub dequeue_timeout: Duration,
    pub revisit_probability: f64,
    pub max_traces: Option<u64>,
    pub updates: Option<UpdatePipe>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Probe frontier addresses until the stop signal is set or a stop marker
/// is dequeued.
pub async fn run_worker<T: Tracer>(ctx: WorkerContext<T>) -> WorkerReport {
    let mut report = WorkerReport::default();

    while !ctx.stop.is_set() {
        let item = tokio::select! {
            _ = ctx.stop.wait() => break,
            item = ctx.frontier.next(ctx.dequeue_timeout) => item,
        };
        let addr = match item {
            None => continue,
            Some(WorkItem::Stop) => {
                ctx.frontier.ack();
                break;
            }
            Some(WorkItem::Probe(addr)) => addr,
        };

        let outcome = tokio::select! {
            _ = ctx.stop.wait() => {
                ctx.frontier.complete(&addr);
                break;
            }
            outcome = ctx.tracer.probe(&addr, &ctx.settings) => outcome,
        };
        report.processed += 1;

        match outcome {
            Ok(hops) if !hops.is_empty() => {
                report.succeeded += 1;
                record_success(&ctx, &addr, &hops).await;
            }
            Ok(_) => debug!(worker = ctx.id, target = %addr, "no hops"),
            Err(err) => {
                report.failed += 1;
                warn!(worker = ctx.id, target = %addr, error = %err, "traceroute failed");
            }
        }
        ctx.frontier.complete(&addr);

        tokio::select! {
            _ = ctx.stop.wait() => break,
            _ = tokio::time::sleep(ctx.pacing.jittered()) => {}
        }
    }

    debug!(worker = ctx.id, processed = report.processed, "worker stopped");
    report
}

async fn record_success<T>(ctx: &WorkerContext<T>, addr: &str, hops: &[Hop]) {
    ctx.graph.lock().await.observe(hops);

    let tally = ctx.counter.increment_and_get();
    if let Some(limit) = ctx.max_traces {
        if tally.total >= limit && !ctx.stop.is_set() {
            info!(limit, "max traces reached");
            ctx.stop.trigger();
        }
    }
    if let Some(updates) = &ctx.updates {
        updates.publish(Update::graph_now());
    }

    let probability = if ctx.revisit_probability.is_nan() {
        0.0
    } else {
        ctx.revisit_probability.clamp(0.0, 1.0)
    };
    let queued = {
        let mut rng = rand::thread_rng();
        ctx.frontier
            .expand(hops, || rng.gen_bool(probability))
    };
    debug!(
        worker = ctx.id,
        target = %addr,
        hops = hops.len(),
        queued,
        total = tally.total,
        "trace recorded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_graph;
    use latmesh_graph::GraphStore;

    #[test]
    fn pacing_stays_within_jitter_band() {
        let pacing = Pacing::from_pps(2.0);
        assert_eq!(pacing.delay(), Duration::from_millis(500));
        for _ in 0..100 {
            let pause = pacing.jittered();
            assert!(pause >= Duration::from_millis(399));
            assert!(pause <= Duration::from_millis(601));
        }
        let slowest = Pacing::from_pps(0.0).delay().as_secs_f64();
        assert!((slowest - 1000.0).abs() < 1e-6);
    }

    struct Chain;

    impl Tracer for Chain {
        async fn probe(
            &self,
            target: &str,
            _settings: &TraceSettings,
        ) -> anyhow::Result<Vec<Hop>> {
            if target == "192.0.2.66" {
                anyhow::bail!("unreachable");
            }
            Ok(vec![Hop::new("10.0.0.1", 1.0), Hop::new(target, 5.0)])
        }
    }

    fn context(frontier: Arc<Frontier>, stop: StopSignal) -> WorkerContext<Chain> {
        WorkerContext {
            id: 0,
            tracer: Arc::new(Chain),
            settings: TraceSettings::default(),
            graph: shared_graph(GraphStore::new()),
            frontier,
            counter: Arc::new(SuccessCounter::new()),
            stop,
            pacing: Pacing::from_pps(1000.0),
            dequeue_timeout: Duration::from_secs(1),
            revisit_probability: 0.0,
            max_traces: None,
            updates: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_skipped_and_stop_marker_ends_the_loop() {
        let frontier = Arc::new(Frontier::new(Vec::new()));
        frontier.seed(vec!["192.0.2.66".to_string(), "192.0.2.7".to_string()]);
        frontier.push(WorkItem::Stop);

        let ctx = context(Arc::clone(&frontier), StopSignal::new());
        let graph = Arc::clone(&ctx.graph);
        let report = run_worker(ctx).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(graph.lock().await.node_count(), 2);
        assert!(!frontier.is_pending("192.0.2.66"));
        // "10.0.0.1" was discovered after the stop marker.
        assert_eq!(frontier.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_stops_within_one_dequeue_timeout() {
        let frontier = Arc::new(Frontier::new(Vec::new()));
        let stop = StopSignal::new();
        let worker = tokio::spawn(run_worker(context(frontier, stop.clone())));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        stop.trigger();
        let report = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker outlived the dequeue timeout")
            .unwrap();
        assert_eq!(report.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn max_traces_sets_the_stop_signal() {
        let frontier = Arc::new(Frontier::new(Vec::new()));
        frontier.seed((1..=5).map(|i| format!("192.0.2.{i}")));
        let stop = StopSignal::new();
        let mut ctx = context(frontier, stop.clone());
        ctx.max_traces = Some(2);
        let counter = Arc::clone(&ctx.counter);

        run_worker(ctx).await;
        assert!(stop.is_set());
        assert_eq!(counter.get().total, 2);
    }
}
