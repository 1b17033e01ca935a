use anyhow::{bail, Context, Result};
use axum::Router;
use std::future::Future;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;

/// Serve the files under `directory` as-is.
pub async fn serve_directory<F>(directory: &Path, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !directory.is_dir() {
        bail!("Directory not found: {}", directory.display());
    }
    let root = directory
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", directory.display()))?;

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;
    info!(root = %root.display(), %addr, "serving directory");

    let app = Router::new().fallback_service(ServeDir::new(root));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("directory server stopped");
    Ok(())
}
