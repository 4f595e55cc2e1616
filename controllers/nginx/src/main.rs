//! Nginx Controller
//!
//! Converges every `Nginx` resource toward a Deployment running the configured
//! image at `spec.size` replicas and a NodePort Service in front of it, then
//! reports what it observed in the resource status.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Nginx Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Image: {}", config.template.image);
    info!("  Port: {}", config.template.port);
    match config.template.node_port {
        Some(port) => info!("  Node port: {}", port),
        None => info!("  Node port: allocated by the API server"),
    }
    info!("  Retry interval: {:?}", config.retry_interval);
    info!("  Max error backoff: {:?}", config.backoff_max);
    info!("  Debounce: {:?}, concurrency: {}", config.debounce, config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
