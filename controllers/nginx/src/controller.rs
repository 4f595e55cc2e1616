//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the cluster
//! client, stores and reconciler together and runs the watcher.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::watch_nginxes;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for Nginx resources.
pub struct Controller {
    nginx_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Nginx Controller");

        let kube_client = Client::try_default().await?;

        let store = KubeStore::new(kube_client.clone());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            store.clone(),
            store,
            &config,
        ));

        let nginx_watcher = tokio::spawn(async move {
            watch_nginxes(kube_client, reconciler, &config).await
        });

        Ok(Self { nginx_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Nginx Controller running");

        self.nginx_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Nginx watcher panicked: {}", e)))??;

        info!("Nginx Controller stopped");
        Ok(())
    }
}
