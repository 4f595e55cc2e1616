//! Desired-state translation.
//!
//! Pure functions from an `Nginx` to the Deployment and Service it implies.
//! No I/O and no failure modes: the same Nginx and template always produce
//! identical objects. Owner references are attached later, on create.

use crate::config::WorkloadTemplate;
use crds::Nginx;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

const APP_NAME: &str = "nginx";
const MANAGED_BY: &str = "nginx-operator";
const CONTAINER_NAME: &str = "nginx-service";
const PORT_NAME: &str = "nginx";

pub fn workload_name(nginx: &Nginx) -> String {
    format!("{}-deployment", nginx.name_any())
}

pub fn endpoint_name(nginx: &Nginx) -> String {
    format!("{}-service", nginx.name_any())
}

/// Label set shared by the Deployment, its pod template and both selectors.
///
/// The Service selector must select exactly this Nginx's pods, so every
/// derived object uses this one map.
pub fn labels(nginx: &Nginx) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), nginx.name_any()),
        ("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string()),
    ])
}

/// Desired replica count. Negative sizes are treated as zero.
pub fn desired_replicas(nginx: &Nginx) -> i32 {
    nginx.spec.size.max(0)
}

fn object_meta(nginx: &Nginx, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: nginx.namespace(),
        labels: Some(labels(nginx)),
        ..ObjectMeta::default()
    }
}

pub fn derive_workload_spec(nginx: &Nginx, template: &WorkloadTemplate) -> Deployment {
    let labels = labels(nginx);

    Deployment {
        metadata: object_meta(nginx, workload_name(nginx)),
        spec: Some(DeploymentSpec {
            replicas: Some(desired_replicas(nginx)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(template.image.clone()),
                        image_pull_policy: Some("Always".to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: template.port,
                            name: Some(PORT_NAME.to_string()),
                            ..ContainerPort::default()
                        }]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

pub fn derive_endpoint_spec(nginx: &Nginx, template: &WorkloadTemplate) -> Service {
    Service {
        metadata: object_meta(nginx, endpoint_name(nginx)),
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(labels(nginx)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: template.port,
                target_port: Some(IntOrString::Int(template.port)),
                node_port: template.node_port,
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}
