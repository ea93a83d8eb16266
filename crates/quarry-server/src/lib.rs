//! # quarry-server
//!
//! Project lifecycle and the REST surface over it.
//!
//! - [`manager::ProjectManager`]: create, rename, delete and replace-file,
//!   plus the insight and suggestion relays
//! - [`routes::router`]: axum routes under `/api/projects`
//! - [`error::ApiError`]: `{message, error}` bodies with mapped status codes

pub mod error;
pub mod manager;
pub mod routes;
mod upload;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use quarry_core::error::Result;
use quarry_core::QuarryConfig;
use tokio::net::TcpListener;

pub use manager::ProjectManager;
pub use upload::UPLOAD_FIELD;

/// Build the router for `config`, creating the vault directory if needed.
///
/// # Errors
///
/// Returns an error if the vault directory cannot be created or the analysis
/// client cannot be built.
pub async fn app(config: &QuarryConfig) -> Result<Router> {
    let manager = ProjectManager::from_config(config)?;
    manager.vault().ensure_directory().await?;
    tracing::info!(
        root = %config.root.display(),
        database = %manager.store().path().display(),
        vault = %manager.vault().dir().display(),
        analysis = %config.analysis.endpoint,
        "project manager ready"
    );
    Ok(routes::router(Arc::new(manager)))
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`quarry_core::QuarryError::Io`] if the server fails.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
