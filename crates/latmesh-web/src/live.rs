//! `serve`: a scan and the API sharing one graph.

use crate::handlers::ApiState;
use crate::router;
use anyhow::{Context, Result};
use latmesh_graph::load_graph;
use latmesh_scan::{
    forward_updates, shared_graph, GraphBroadcast, NullCanvas, ScanConfig, ScanError,
    ScanOutcome, Scanner, SignalGuard, StopSignal, Update, UpdatePipe,
};
use latmesh_trace::Tracer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub heartbeat: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat: Duration::from_secs(15),
        }
    }
}

/// Bind, scan and serve until interrupted.
pub async fn serve_live<T: Tracer>(
    config: ScanConfig,
    tracer: Arc<T>,
    options: ServeOptions,
) -> Result<()> {
    let listener = TcpListener::bind((options.host.as_str(), options.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", options.host, options.port))?;

    let interrupt = StopSignal::new();
    let signals = SignalGuard::install(interrupt.clone());
    let live = LiveService::start(config, tracer, listener, options.heartbeat)?;
    info!(addr = %live.local_addr(), "serving live map");

    interrupt.wait().await;
    info!("server exiting");
    drop(signals);
    live.shutdown().await
}

/// A running scan, its update forwarder and the HTTP server.
pub struct LiveService {
    addr: SocketAddr,
    state: ApiState,
    pipe: UpdatePipe,
    scan_stop: StopSignal,
    server_stop: CancellationToken,
    scan: JoinHandle<Result<ScanOutcome, ScanError>>,
    forwarder: JoinHandle<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl LiveService {
    /// The scan runs headless and leaves signal handling to the caller.
    /// Must be called from within a tokio runtime.
    pub fn start<T: Tracer>(
        config: ScanConfig,
        tracer: Arc<T>,
        listener: TcpListener,
        heartbeat: Duration,
    ) -> Result<Self> {
        let config = ScanConfig {
            display: false,
            handle_signals: false,
            ..config
        };
        let graph = shared_graph(load_graph(&config.save_base)?);
        let broadcast = GraphBroadcast::new();
        let pipe = UpdatePipe::with_capacity(1);
        let state = ApiState::new(Arc::clone(&graph), broadcast.clone()).with_heartbeat(heartbeat);
        let addr = listener.local_addr().context("listener has no local address")?;

        let server_stop = CancellationToken::new();
        let server = {
            let app = router(state.clone());
            let shutdown = server_stop.clone().cancelled_owned();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
            })
        };
        let forwarder = tokio::spawn(forward_updates(pipe.clone(), broadcast));

        let scanner = Scanner::new(config, tracer, NullCanvas)
            .with_graph(graph)
            .with_updates(pipe.clone());
        let scan_stop = scanner.stop_signal();
        let scan = tokio::spawn(scanner.run());

        Ok(Self {
            addr,
            state,
            pipe,
            scan_stop,
            server_stop,
            scan,
            forwarder,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    /// Stop accepting, stop the scan (which saves), close the stream feed
    /// and wait for the server to drain.
    pub async fn shutdown(self) -> Result<()> {
        self.server_stop.cancel();
        self.scan_stop.trigger();

        match self.scan.await {
            Ok(Ok(outcome)) => info!(successes = outcome.successes, "scan stopped"),
            Ok(Err(err)) => warn!(error = %err, "scan ended with an error"),
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "scan task failed"),
        }

        self.pipe.publish(Update::Shutdown);
        if let Err(err) = self.forwarder.await {
            if !err.is_cancelled() {
                warn!(error = %err, "update forwarder failed");
            }
        }

        match self.server.await {
            Ok(result) => result.context("http server failed"),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err::<(), _>(err).context("http server task failed"),
        }
    }
}
