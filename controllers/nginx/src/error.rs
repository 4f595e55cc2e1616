//! Controller-specific error types.
//!
//! This module defines error types specific to the Nginx Controller
//! that are not covered by upstream library errors.

use crate::store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Nginx Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error outside the store layer (client setup)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Fetch/create/update/status fault from a cluster store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Owner reference could not be attached to a managed resource
    #[error("Failed to set owner reference on {kind} {name}: {reason}")]
    OwnerReference {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
