//! Nginx CRD
//!
//! Declares a replicated nginx service. The controller derives a Deployment
//! and a Service from it and reports what it observed in the status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "nginx.persistent.com",
    version = "v1alpha1",
    kind = "Nginx",
    shortname = "ngx",
    namespaced,
    status = "NginxStatus",
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NginxSpec {
    /// Desired number of nginx replicas
    pub size: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NginxStatus {
    /// Image the managed Deployment runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_image: Option<String>,

    /// Name of the managed Deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Name of the managed Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Replica count last observed on the Deployment spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Ready replicas last observed on the Deployment status
    #[serde(default)]
    pub ready_replicas: i32,

    /// Coarse convergence phase
    #[serde(default)]
    pub phase: NginxPhase,

    /// Last time `phase` changed. Only written on a phase change so that
    /// repeated passes produce identical status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,

    /// `metadata.generation` of the Nginx this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Convergence phase of an Nginx
///
/// Serializes as PascalCase ("Pending", "Scaling", "Ready").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum NginxPhase {
    /// Deployment exists but not every replica is ready yet
    #[default]
    Pending,

    /// Deployment replica count differs from `spec.size`
    Scaling,

    /// Every desired replica is ready
    Ready,
}

impl std::fmt::Display for NginxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NginxPhase::Pending => "Pending",
            NginxPhase::Scaling => "Scaling",
            NginxPhase::Ready => "Ready",
        };
        f.write_str(s)
    }
}
