//! # Bastion Control API
//!
//! HTTP surface of the Bastion control plane: rate-limit decisions, generation
//! jobs, fault injection and the internal credential authority, plus health
//! and metrics endpoints.
//!
//! ## AppState
//!
//! [`AppState::initialize`] wires every component from the configuration; the
//! builder is available when a caller needs to swap one out:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bastion_control_api::AppState;
//! use bastion_control_config::Config;
//! use bastion_control_core::{MasterKey, SecretEncryptor};
//! use bastion_control_storage::Backend;
//!
//! # async fn example(config: Arc<Config>) -> bastion_control_types::Result<()> {
//! let encryptor = SecretEncryptor::from_master_key(&MasterKey::ephemeral())?;
//! let state = AppState::initialize(config, Backend::memory(), encryptor, None, "control-0").await?;
//! let router = bastion_control_api::create_router_with_state(state);
//! # let _ = router;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

use std::net::SocketAddr;

use tracing::info;

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use bastion_control_types::dto::ErrorResponse;
pub use error::{ApiError, set_expose_internal_errors};
pub use extract::{ValidatedJson, extract_client_ip, resolve_caller};
pub use handlers::AppState;
pub use routes::create_router_with_state;

/// Resolves on Ctrl+C or SIGTERM
///
/// A signal handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating shutdown");
        }
    }
}

/// Serve the control API until a shutdown signal arrives
///
/// In-flight requests are drained before this returns; stopping background
/// work and releasing leadership is left to the caller.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let listen = state.config.listen;
    set_expose_internal_errors(state.config.is_dev_mode());

    let router = routes::create_router_with_state(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listen, "Bastion Control listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    Ok(())
}
