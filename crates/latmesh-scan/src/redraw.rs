//! Live map redraw scheduling.

use crate::config::UpdateMode;
use crate::counter::SuccessCounter;
use crate::stop::StopSignal;
use crate::SharedGraph;
use latmesh_graph::GraphStore;
use latmesh_render::PngCanvas;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Where redraws go.
pub trait Canvas: Send + 'static {
    fn draw(&mut self, graph: &GraphStore) -> anyhow::Result<()>;

    /// Release whatever the canvas holds. Called once at shutdown.
    fn close(&mut self) {}
}

impl Canvas for PngCanvas {
    fn draw(&mut self, graph: &GraphStore) -> anyhow::Result<()> {
        PngCanvas::draw(self, graph)?;
        Ok(())
    }

    fn close(&mut self) {
        PngCanvas::close(self);
    }
}

/// Canvas for headless scans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn draw(&mut self, _graph: &GraphStore) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Redraw `canvas` according to `mode` until `stop` is set, then draw once
/// more so the output reflects the final graph. Hands the canvas back.
pub async fn run_redraw<C: Canvas>(
    mut canvas: C,
    graph: SharedGraph,
    counter: Arc<SuccessCounter>,
    stop: StopSignal,
    mode: UpdateMode,
) -> C {
    match mode {
        UpdateMode::Fixed { interval } => loop {
            tokio::select! {
                _ = stop.wait() => break,
                _ = tokio::time::sleep(interval) => {
                    redraw(&mut canvas, &graph).await;
                    counter.reset();
                }
            }
        },
        UpdateMode::Dynamic { count } => {
            let wake = Arc::new(Notify::new());
            {
                let wake = Arc::clone(&wake);
                counter.subscribe(move || wake.notify_one());
            }
            let threshold = count.max(1);
            loop {
                // Successes recorded before the subscription existed never woke us.
                if let Some(pending) = counter.take_if_at_least(threshold) {
                    debug!(pending, "success threshold reached");
                    redraw(&mut canvas, &graph).await;
                }
                tokio::select! {
                    _ = stop.wait() => break,
                    _ = wake.notified() => {}
                }
            }
            counter.unsubscribe();
        }
    }

    redraw(&mut canvas, &graph).await;
    canvas
}

async fn redraw<C: Canvas>(canvas: &mut C, graph: &SharedGraph) {
    let snapshot = graph.lock().await.clone();
    if let Err(err) = canvas.draw(&snapshot) {
        warn!(error = %err, "redraw failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_graph;
    use latmesh_model::Hop;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CountingCanvas {
        draws: Arc<AtomicUsize>,
        nodes_at_last_draw: Arc<AtomicUsize>,
    }

    impl Canvas for CountingCanvas {
        fn draw(&mut self, graph: &GraphStore) -> anyhow::Result<()> {
            self.draws.fetch_add(1, Ordering::SeqCst);
            self.nodes_at_last_draw
                .store(graph.node_count(), Ordering::SeqCst);
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dynamic_mode_draws_once_per_threshold() {
        let canvas = CountingCanvas::default();
        let draws = Arc::clone(&canvas.draws);
        let counter = Arc::new(SuccessCounter::new());
        let stop = StopSignal::new();
        let task = tokio::spawn(run_redraw(
            canvas,
            shared_graph(GraphStore::new()),
            Arc::clone(&counter),
            stop.clone(),
            UpdateMode::Dynamic { count: 2 },
        ));
        settle().await;

        for expected in [0, 1, 1, 2] {
            counter.increment_and_get();
            settle().await;
            assert_eq!(draws.load(Ordering::SeqCst), expected);
        }

        stop.trigger();
        task.await.unwrap();
        // One final unconditional draw.
        assert_eq!(draws.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn successes_before_first_poll_still_trigger_a_draw() {
        let canvas = CountingCanvas::default();
        let draws = Arc::clone(&canvas.draws);
        let counter = Arc::new(SuccessCounter::new());
        let stop = StopSignal::new();

        counter.increment_and_get();
        counter.increment_and_get();
        let task = tokio::spawn(run_redraw(
            canvas,
            shared_graph(GraphStore::new()),
            Arc::clone(&counter),
            stop.clone(),
            UpdateMode::Dynamic { count: 2 },
        ));
        settle().await;
        assert_eq!(draws.load(Ordering::SeqCst), 1);
        assert_eq!(counter.get().since_last_draw, 0);

        stop.trigger();
        task.await.unwrap();
        assert_eq!(draws.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_mode_draws_on_interval_and_resets() {
        let canvas = CountingCanvas::default();
        let draws = Arc::clone(&canvas.draws);
        let counter = Arc::new(SuccessCounter::new());
        let stop = StopSignal::new();
        let task = tokio::spawn(run_redraw(
            canvas,
            shared_graph(GraphStore::new()),
            Arc::clone(&counter),
            stop.clone(),
            UpdateMode::Fixed {
                interval: Duration::from_secs(1),
            },
        ));

        counter.increment_and_get();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(draws.load(Ordering::SeqCst), 2);
        assert_eq!(counter.get().since_last_draw, 0);

        stop.trigger();
        task.await.unwrap();
        assert_eq!(draws.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn final_draw_sees_the_last_graph() {
        let canvas = CountingCanvas::default();
        let nodes = Arc::clone(&canvas.nodes_at_last_draw);
        let graph = shared_graph(GraphStore::new());
        let stop = StopSignal::new();
        stop.trigger();
        graph
            .lock()
            .await
            .observe(&[Hop::new("10.0.0.1", 1.0), Hop::new("10.0.0.2", 2.0)]);

        run_redraw(
            canvas,
            graph,
            Arc::new(SuccessCounter::new()),
            stop,
            UpdateMode::default(),
        )
        .await;
        assert_eq!(nodes.load(Ordering::SeqCst), 2);
    }
}
