//! Scan lifecycle: start everything, wait for the stop signal, shut down in
//! a fixed order.

use crate::broadcast::{Update, UpdatePipe};
use crate::config::ScanConfig;
use crate::counter::SuccessCounter;
use crate::frontier::Frontier;
use crate::pool::generate_pool;
use crate::redraw::{run_redraw, Canvas};
use crate::signals::SignalGuard;
use crate::stop::StopSignal;
use crate::worker::{run_worker, Pacing, WorkerContext, WorkerReport};
use crate::{shared_graph, SharedGraph};
use latmesh_graph::{load_graph, save_graph, GraphIoError};
use latmesh_trace::Tracer;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no addresses in pool; check seeds and prefix")]
    EmptyPool,
    #[error(transparent)]
    Graph(#[from] GraphIoError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub successes: u64,
    pub nodes: usize,
    pub edges: usize,
    pub saved_to: PathBuf,
}

/// One discovery run over a shared graph.
pub struct Scanner<T, C> {
    config: ScanConfig,
    tracer: Arc<T>,
    canvas: C,
    graph: Option<SharedGraph>,
    updates: Option<UpdatePipe>,
    stop: StopSignal,
    log_guard: Option<Box<dyn Any + Send>>,
}

impl<T: Tracer, C: Canvas> Scanner<T, C> {
    pub fn new(config: ScanConfig, tracer: Arc<T>, canvas: C) -> Self {
        Self {
            config,
            tracer,
            canvas,
            graph: None,
            updates: None,
            stop: StopSignal::new(),
            log_guard: None,
        }
    }

    /// Scan into `graph` instead of loading `save_base`.
    pub fn with_graph(mut self, graph: SharedGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Publish graph changes (and a final shutdown) to `pipe`.
    pub fn with_updates(mut self, pipe: UpdatePipe) -> Self {
        self.updates = Some(pipe);
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Held until the graph is saved, then dropped to flush logging.
    pub fn with_log_guard(mut self, guard: impl Any + Send) -> Self {
        self.log_guard = Some(Box::new(guard));
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub async fn run(self) -> Result<ScanOutcome, ScanError> {
        let Scanner {
            config,
            tracer,
            canvas,
            graph,
            updates,
            stop,
            log_guard,
        } = self;

        let seeds = config.effective_seeds();
        let pool = generate_pool(&seeds, config.prefix, config.max_per_seed);
        if pool.is_empty() {
            error!(?seeds, prefix = config.prefix, "no addresses in pool; check seeds/prefix");
            stop.trigger();
            return Err(ScanError::EmptyPool);
        }

        let graph = match graph {
            Some(graph) => graph,
            None => shared_graph(load_graph(&config.save_base)?),
        };
        let known: Vec<String> = graph
            .lock()
            .await
            .nodes()
            .map(|(id, _)| id.to_string())
            .collect();
        let frontier = Arc::new(Frontier::new(known));
        let queued = frontier.seed(pool);
        let counter = Arc::new(SuccessCounter::new());

        if config.max_traces == Some(0) {
            info!("max traces is zero, stopping immediately");
            stop.trigger();
        }

        let signals = config.handle_signals.then(|| SignalGuard::install(stop.clone()));
        let timer = config.duration.map(|duration| {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        info!(?duration, "scan duration elapsed");
                        stop.trigger();
                    }
                    _ = stop.wait() => {}
                }
            })
        });

        info!(
            workers = config.workers,
            prefix = config.prefix,
            pool = queued,
            pps = config.effective_pps(),
            "mapping local neighborhood"
        );

        let pacing = Pacing::from_pps(config.effective_pps());
        let settings = config.trace_settings();
        let workers: Vec<JoinHandle<WorkerReport>> = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(WorkerContext {
                    id,
                    tracer: Arc::clone(&tracer),
                    settings: settings.clone(),
                    graph: Arc::clone(&graph),
                    frontier: Arc::clone(&frontier),
                    counter: Arc::clone(&counter),
                    stop: stop.clone(),
                    pacing,
                    dequeue_timeout: config.dequeue_timeout,
                    revisit_probability: config.revisit_probability,
                    max_traces: config.max_traces,
                    updates: updates.clone(),
                }))
            })
            .collect();

        let (redraw, idle_canvas) = if config.display {
            let task = tokio::spawn(run_redraw(
                canvas,
                Arc::clone(&graph),
                Arc::clone(&counter),
                stop.clone(),
                config.update_mode,
            ));
            (Some(task), None)
        } else {
            (None, Some(canvas))
        };

        stop.wait().await;
        info!("stopping scan");
        drop(signals);
        if let Some(timer) = timer {
            timer.abort();
        }

        // 1-2. Workers and the redraw task leave at their next suspension
        // point; the redraw task draws once more on the way out.
        let mut report = WorkerReport::default();
        for worker in workers {
            match worker.await {
                Ok(done) => {
                    report.processed += done.processed;
                    report.succeeded += done.succeeded;
                    report.failed += done.failed;
                }
                Err(err) => log_join_error("worker", err),
            }
        }
        let mut canvas = match redraw {
            Some(task) => match task.await {
                Ok(canvas) => Some(canvas),
                Err(err) => {
                    log_join_error("redraw", err);
                    None
                }
            },
            None => idle_canvas,
        };

        // 3. persist.
        let (saved, nodes, edges) = {
            let graph = graph.lock().await;
            (
                save_graph(&graph, &config.save_base),
                graph.node_count(),
                graph.edge_count(),
            )
        };
        if let Err(err) = &saved {
            error!(error = %err, "failed to save graph");
        }

        // 4. visualization.
        if let Some(canvas) = canvas.as_mut() {
            canvas.close();
        }

        let successes = counter.get().total;
        info!(
            successes,
            processed = report.processed,
            failed = report.failed,
            nodes,
            edges,
            "scan finished"
        );

        // 5. logging.
        drop(log_guard);

        // 6. live subscribers.
        if let Some(updates) = &updates {
            updates.publish(Update::Shutdown);
        }

        Ok(ScanOutcome {
            successes,
            nodes,
            edges,
            saved_to: saved?,
        })
    }
}

fn log_join_error(task: &str, err: JoinError) {
    if err.is_cancelled() {
        return;
    }
    warn!(task, error = %err, "task ended abnormally");
}
