//! Status publishing.
//!
//! The observed status is written through the status subresource only, so a
//! concurrent spec edit is never clobbered. Writes are skipped when nothing
//! changed; `lastTransitionTime` only moves when the phase does, which keeps
//! repeated passes from producing new status objects.

use super::drift::live_replicas;
use super::translate::{desired_replicas, endpoint_name, workload_name};
use super::{Reconciler, Step, Verdict};
use crate::config::WorkloadTemplate;
use chrono::{DateTime, Utc};
use crds::{Nginx, NginxPhase, NginxStatus};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

/// Computes the status to publish for `nginx` given its live Deployment.
pub(crate) fn observed_status(
    nginx: &Nginx,
    deployment: &Deployment,
    template: &WorkloadTemplate,
    now: DateTime<Utc>,
) -> NginxStatus {
    let desired = desired_replicas(nginx);
    let replicas = live_replicas(deployment);
    let ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);

    let phase = if replicas != desired {
        NginxPhase::Scaling
    } else if ready_replicas == desired {
        NginxPhase::Ready
    } else {
        NginxPhase::Pending
    };

    let previous = nginx.status.as_ref();
    let last_transition_time = match previous {
        Some(prev) if prev.phase == phase => prev.last_transition_time,
        _ => Some(now),
    };

    NginxStatus {
        backend_image: Some(template.image.clone()),
        deployment_name: Some(workload_name(nginx)),
        service_name: Some(endpoint_name(nginx)),
        replicas: Some(replicas),
        ready_replicas,
        phase,
        last_transition_time,
        observed_generation: nginx.metadata.generation,
    }
}

impl Reconciler {
    pub(crate) async fn publish_status(&self, nginx: &Nginx, deployment: &Deployment) -> Step<()> {
        let namespace = nginx.namespace().unwrap_or_default();
        let name = nginx.name_any();
        let status = observed_status(nginx, deployment, &self.template, Utc::now());

        if nginx.status.as_ref() == Some(&status) {
            debug!("Nginx {}/{} status is up-to-date, skipping update", namespace, name);
            return ControlFlow::Continue(());
        }

        match self.nginx_store.update_status(nginx, &status).await {
            Ok(()) => {
                info!(
                    "Updated Nginx {}/{} status: phase {}, {}/{} replicas ready",
                    namespace, name, status.phase, status.ready_replicas, desired_replicas(nginx)
                );
                ControlFlow::Continue(())
            }
            Err(e) => {
                // Status is observational; the caller requeues
                warn!("Failed to update Nginx {}/{} status: {}", namespace, name, e);
                ControlFlow::Break(Verdict::done().with_error(e))
            }
        }
    }
}
