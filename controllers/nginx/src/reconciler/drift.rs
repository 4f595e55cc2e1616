//! Scale drift correction.
//!
//! Only the replica count is corrected. Image, port and label changes on the
//! live Deployment and any change on the Service are left alone: those fields
//! are immutable after create.

use super::translate::{desired_replicas, workload_name};
use super::{Reconciler, Verdict};
use crds::Nginx;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

/// Replica count of a live Deployment. An unset count is the API default, 1.
pub(crate) fn live_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1)
}

impl Reconciler {
    pub(crate) async fn correct_drift(&self, nginx: &Nginx) -> Verdict {
        let namespace = nginx.namespace().unwrap_or_default();
        let name = workload_name(nginx);

        let mut live = match self.deployment_store.get(&namespace, &name).await {
            Ok(deployment) => deployment,
            Err(e) => {
                // Expected right after creation, before the Deployment is readable
                warn!(
                    "Failed to get Deployment {}/{}: {}, retrying in {:?}",
                    namespace, name, e, self.retry_interval
                );
                return Verdict::requeue_after(self.retry_interval).with_error(e);
            }
        };

        let desired = desired_replicas(nginx);
        let current = live_replicas(&live);
        if current == desired {
            debug!("Deployment {}/{} has {} replicas as desired", namespace, name, desired);
            return Verdict::done();
        }

        info!(
            "Scaling Deployment {}/{} from {} to {} replicas",
            namespace, name, current, desired
        );
        live.spec.get_or_insert_with(DeploymentSpec::default).replicas = Some(desired);

        match self.deployment_store.update(&live).await {
            Ok(_) => Verdict::requeue_now(),
            Err(e) if e.is_conflict() => {
                // Modified since our read; re-read on the next pass
                debug!("Deployment {}/{} changed while scaling it", namespace, name);
                Verdict::requeue_now()
            }
            Err(e) => {
                error!("Failed to update Deployment {}/{}: {}", namespace, name, e);
                Verdict::done().with_error(e)
            }
        }
    }
}
