//! Shared runtime plumbing for FleetOS binaries
//!
//! - `init_tracing`: `tracing-subscriber` with `RUST_LOG` filtering
//! - `shutdown_signal`: resolves on SIGINT or SIGTERM
//! - `Metrics`: Prometheus counters for reconcile passes and agent calls
//! - `serve_probes`: `/healthz`, `/readyz` and `/metrics` over HTTP

pub mod error;
pub mod metrics;
pub mod server;

pub use error::ProbeError;
pub use metrics::Metrics;
pub use server::{router, serve_probes, ProbeState};

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Defaults to `info` when
/// `RUST_LOG` is unset or invalid.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves when the process receives SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
