//! Generic "ensure" step: get-or-create of a managed resource.

use super::translate::{derive_endpoint_spec, derive_workload_spec};
use super::{Reconciler, Step, Verdict};
use crate::store::{set_owner, ResourceStore};
use crds::Nginx;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use std::ops::ControlFlow;
use tracing::{debug, error, info, warn};

impl Reconciler {
    /// Makes sure `desired` exists in `store`.
    ///
    /// - exists: continue with the live object, contents are not compared
    /// - missing: create it owned by `owner` and requeue immediately so the
    ///   next pass sees what the cluster materialized
    /// - any other fault: requeue after the retry interval without mutating
    ///
    /// Against a converged cluster this performs no mutating calls.
    pub(crate) async fn ensure<K>(
        &self,
        store: &dyn ResourceStore<K>,
        owner: &Nginx,
        mut desired: K,
    ) -> Step<K>
    where
        K: Resource<DynamicType = ()> + Send + Sync,
    {
        let kind = K::kind(&());
        let name = desired.name_any();
        let namespace = desired.namespace().unwrap_or_default();

        match store.get(&namespace, &name).await {
            Ok(live) => {
                debug!("{} {}/{} already exists", kind, namespace, name);
                ControlFlow::Continue(live)
            }
            Err(e) if e.is_not_found() => {
                if let Err(e) = set_owner(&mut desired, owner) {
                    error!("Cannot create {} {}/{}: {}", kind, namespace, name, e);
                    return ControlFlow::Break(Verdict::requeue_after(self.retry_interval).with_error(e));
                }

                info!("Creating {} {}/{}", kind, namespace, name);
                match store.create(&desired).await {
                    Ok(_) => {
                        info!("Created {} {}/{}", kind, namespace, name);
                        ControlFlow::Break(Verdict::requeue_now())
                    }
                    Err(e) if e.is_conflict() => {
                        // Created concurrently since our read; the next pass picks it up
                        debug!("{} {}/{} appeared while creating it", kind, namespace, name);
                        ControlFlow::Break(Verdict::requeue_now())
                    }
                    Err(e) => {
                        error!("Failed to create {} {}/{}: {}", kind, namespace, name, e);
                        ControlFlow::Break(Verdict::requeue_after(self.retry_interval).with_error(e))
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to get {} {}/{}: {}, retrying in {:?}",
                    kind, namespace, name, e, self.retry_interval
                );
                ControlFlow::Break(Verdict::requeue_after(self.retry_interval).with_error(e))
            }
        }
    }

    pub(crate) async fn ensure_workload(&self, nginx: &Nginx) -> Step<Deployment> {
        let desired = derive_workload_spec(nginx, &self.template);
        self.ensure(self.deployment_store.as_ref(), nginx, desired).await
    }

    pub(crate) async fn ensure_endpoint(&self, nginx: &Nginx) -> Step<Service> {
        let desired = derive_endpoint_spec(nginx, &self.template);
        self.ensure(self.service_store.as_ref(), nginx, desired).await
    }
}
