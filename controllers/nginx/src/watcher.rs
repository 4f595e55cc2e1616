//! Kubernetes resource watcher.
//!
//! Drives reconciliation with `kube_runtime::Controller`. A pass is triggered
//! by any change to an Nginx object or to a Deployment/Service it owns, so a
//! manual scale or delete of a managed resource is noticed without polling.
//! Triggers for the same object are coalesced and passes for one object never
//! run concurrently.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::ObjectKey;
use crds::Nginx;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Api scoped to the watched namespace, or cluster-wide when none is set.
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Maps the outcome of one pass to the controller's next action.
async fn reconcile(nginx: Arc<Nginx>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let key = ObjectKey::of(nginx.as_ref());
    let verdict = reconciler.reconcile(&key).await;

    match verdict.error {
        Some(e) => Err(e),
        None => {
            reconciler.reset_error(&key);
            Ok(verdict.requeue.into_action())
        }
    }
}

/// Failed passes are retried with a per-object backoff.
fn error_policy(nginx: Arc<Nginx>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let key = ObjectKey::of(nginx.as_ref());
    let delay = reconciler.next_error_backoff(&key);
    warn!("Reconciliation error for Nginx {}: {}, retrying in {:?}", key, error, delay);
    Action::requeue(delay)
}

/// Watches Nginx objects and their owned Deployments and Services until the
/// process receives a shutdown signal.
pub async fn watch_nginxes(
    client: Client,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
) -> Result<(), ControllerError> {
    let namespace = config.namespace.as_deref();
    info!(
        "Starting Nginx watcher in {}",
        namespace.unwrap_or("all namespaces")
    );

    let nginxes: Api<Nginx> = scoped_api(&client, namespace);
    let deployments: Api<Deployment> = scoped_api(&client, namespace);
    let services: Api<Service> = scoped_api(&client, namespace);

    // Debounce batches bursts of events (our own status writes included)
    let runtime_config = RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);

    Controller::new(nginxes, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj, action),
                Err(e) => error!("Controller error for Nginx: {}", e),
            }
        })
        .await;

    info!("Nginx watcher stopped");
    Ok(())
}
