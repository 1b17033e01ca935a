//! HTTP surface for a running scan: the browser viewer, JSON snapshots,
//! stats and an SSE feed.

pub mod assets;
pub mod handlers;
pub mod live;
pub mod static_dir;
pub mod stream;

use axum::routing::get;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;
pub use live::{serve_live, LiveService, ServeOptions};
pub use static_dir::serve_directory;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/graph", get(handlers::handle_graph))
        .route("/stats", get(handlers::handle_stats))
        .route("/stream", get(stream::handle_stream))
        .with_state(state);

    Router::new()
        .route("/", get(assets::handle_index))
        .route("/static/{*path}", get(assets::handle_asset))
        .nest("/api", api_routes)
        .layer(cors)
}

/// Serve the API on `listener` until `shutdown` resolves and open
/// connections finish.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
