//! Spendlog is a REST API for tracking personal expenses.
//!
//! Users register and sign in to get a bearer token, then create, update,
//! delete, and list their expense records, filtered by a time window. The
//! interesting part lives in [service]: the expense lifecycle operations and
//! their transactional guarantees. Everything else is plumbing around it.

use std::time::Duration;

use axum_server::Handle;
use tokio::signal;

pub mod auth;
mod config;
pub mod db;
pub mod models;
mod routes;
pub mod service;
pub mod window;

pub use config::AppConfig;
pub use routes::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
