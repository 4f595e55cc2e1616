//! Reconciliation logic for Nginx resources.
//!
//! One pass is an ordered pipeline of named steps:
//!
//! ```text
//! FetchDeclared -> EnsureWorkload -> EnsureEndpoint -> PublishStatus -> CorrectDrift -> Done
//! ```
//!
//! Every step either continues with a value or stops the pass with a
//! [`Verdict`]. Nothing is carried between passes: each one starts from a
//! fresh read of the cluster, so a missed or duplicated trigger only costs an
//! extra pass.
//!
//! - `translate`: Nginx -> Deployment/Service specs (pure)
//! - `ensure`: generic get-or-create of a managed resource
//! - `status`: observed status written through the status subresource
//! - `drift`: scale drift correction on the live Deployment

pub mod translate;
pub mod verdict;
mod drift;
mod ensure;
mod status;

pub use verdict::{Step, Verdict};

use crate::backoff::FibonacciBackoff;
use crate::config::{ControllerConfig, WorkloadTemplate};
use crate::store::{DeclaredStore, ObjectKey, ResourceStore};
use crds::Nginx;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Named steps of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchDeclared,
    EnsureWorkload,
    EnsureEndpoint,
    PublishStatus,
    CorrectDrift,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::FetchDeclared => "FetchDeclared",
            Stage::EnsureWorkload => "EnsureWorkload",
            Stage::EnsureEndpoint => "EnsureEndpoint",
            Stage::PublishStatus => "PublishStatus",
            Stage::CorrectDrift => "CorrectDrift",
        };
        f.write_str(s)
    }
}

/// Logs where a pass stopped and passes the step result through.
fn checkpoint<T>(key: &ObjectKey, stage: Stage, step: Step<T>) -> Step<T> {
    match &step {
        ControlFlow::Continue(_) => debug!("Nginx {}: {} continued", key, stage),
        ControlFlow::Break(verdict) => debug!("Nginx {}: {} stopped the pass: {}", key, stage, verdict),
    }
    step
}

/// Error backoff state for one Nginx
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            backoff: FibonacciBackoff::new(base, max),
            error_count: 0,
        }
    }
}

/// Reconciles Nginx resources against their Deployment and Service.
pub struct Reconciler {
    pub(crate) nginx_store: Box<dyn DeclaredStore>,
    pub(crate) deployment_store: Box<dyn ResourceStore<Deployment>>,
    pub(crate) service_store: Box<dyn ResourceStore<Service>>,
    pub(crate) template: WorkloadTemplate,
    /// Fixed short delay for transient faults
    pub(crate) retry_interval: Duration,
    backoff_max: Duration,
    /// Error backoff per Nginx (namespace/name -> BackoffState)
    backoff_states: Mutex<HashMap<ObjectKey, BackoffState>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        nginx_store: impl DeclaredStore + 'static,
        deployment_store: impl ResourceStore<Deployment> + 'static,
        service_store: impl ResourceStore<Service> + 'static,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            nginx_store: Box::new(nginx_store),
            deployment_store: Box::new(deployment_store),
            service_store: Box::new(service_store),
            template: config.template.clone(),
            retry_interval: config.retry_interval,
            backoff_max: config.backoff_max,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one full reconciliation pass for the Nginx identified by `key`.
    #[instrument(skip(self, key), fields(namespace = %key.namespace, name = %key.name))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Verdict {
        info!("Reconciling Nginx {}", key);

        let (ControlFlow::Break(verdict) | ControlFlow::Continue(verdict)) = self.run_pass(key).await;

        match &verdict.error {
            Some(e) => warn!("Reconciliation of Nginx {} ended with error: {}", key, e),
            None => debug!("Reconciliation of Nginx {} finished: {}", key, verdict),
        }
        verdict
    }

    async fn run_pass(&self, key: &ObjectKey) -> Step<Verdict> {
        let nginx = checkpoint(key, Stage::FetchDeclared, self.fetch_declared(key).await)?;
        let deployment = checkpoint(key, Stage::EnsureWorkload, self.ensure_workload(&nginx).await)?;
        checkpoint(key, Stage::EnsureEndpoint, self.ensure_endpoint(&nginx).await)?;
        checkpoint(key, Stage::PublishStatus, self.publish_status(&nginx, &deployment).await)?;

        let verdict = self.correct_drift(&nginx).await;
        debug!("Nginx {}: {} finished the pass: {}", key, Stage::CorrectDrift, verdict);
        ControlFlow::Continue(verdict)
    }

    async fn fetch_declared(&self, key: &ObjectKey) -> Step<Nginx> {
        match self.nginx_store.get(key).await {
            Ok(nginx) if nginx.metadata.deletion_timestamp.is_some() => {
                // Owned resources are removed by the garbage collector
                debug!("Nginx {} is being deleted, nothing to do", key);
                ControlFlow::Break(Verdict::done())
            }
            Ok(nginx) => ControlFlow::Continue(nginx),
            Err(e) if e.is_not_found() => {
                // Deleted after the trigger was queued; owned resources are
                // garbage collected through their owner references
                info!("Nginx {} not found, assuming it was deleted", key);
                ControlFlow::Break(Verdict::done())
            }
            Err(e) => {
                error!("Failed to fetch Nginx {}: {}", key, e);
                ControlFlow::Break(Verdict::done().with_error(e))
            }
        }
    }

    /// Returns the error backoff for `key` and advances it.
    ///
    /// The first error of a streak is retried after the fixed retry interval,
    /// later ones back off along a Fibonacci sequence capped at the configured
    /// maximum.
    pub fn next_error_backoff(&self, key: &ObjectKey) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.clone())
                    .or_insert_with(|| BackoffState::new(self.retry_interval, self.backoff_max));
                state.error_count += 1;
                let delay = state.backoff.next_backoff();
                debug!("Nginx {} error #{}, backing off {:?}", key, state.error_count, delay);
                delay
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using retry interval", e);
                self.retry_interval
            }
        }
    }

    /// Drops the error streak for `key` after a clean pass.
    ///
    /// Deleted objects end with a clean pass too, so entries never outlive
    /// the object they track.
    pub fn reset_error(&self, key: &ObjectKey) {
        if let Ok(mut states) = self.backoff_states.lock()
            && let Some(state) = states.remove(key)
        {
            info!("Nginx {} recovered after {} failed passes", key, state.error_count);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_errors(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or(0)
    }
}
