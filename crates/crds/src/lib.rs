//! nginx-operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the nginx operator.

pub mod nginx;

pub use nginx::*;
