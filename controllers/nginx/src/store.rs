//! Cluster store abstractions.
//!
//! The reconciler only talks to the cluster through these traits so that each
//! pipeline step can be exercised against in-memory stores in unit tests.
//! `KubeStore` is the API-server backed implementation used at runtime.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{Nginx, NginxStatus};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors returned by the cluster stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The object already exists (create) or was modified since it was read
    /// (update)
    #[error("{kind} {name} conflicts with the stored object")]
    Conflict { kind: String, name: String },

    /// Any other Kubernetes API or transport error
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Fault injected by the in-memory test stores
    #[cfg(test)]
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The object handed to the store lacks a required metadata field
    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),
}

impl StoreError {
    /// Classifies a kube error, mapping HTTP 404 to `NotFound` and 409 to
    /// `Conflict`.
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref response) if response.code == 409 => StoreError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            other => StoreError::Kube(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Identity of a declared Nginx: namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object as delivered by a watch. Objects without a namespace
    /// fall back to `default`.
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(
            obj.namespace().unwrap_or_else(|| "default".to_string()),
            obj.name_any(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Store for the declared state (Nginx objects).
///
/// `update_status` must only touch the status subresource; spec edits made by
/// users concurrently are never overwritten.
#[async_trait]
pub trait DeclaredStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Nginx, StoreError>;
    async fn update_status(&self, nginx: &Nginx, status: &NginxStatus) -> Result<(), StoreError>;
}

/// Store for one kind of managed resource.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync
where
    K: Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;
    async fn create(&self, resource: &K) -> Result<K, StoreError>;
    async fn update(&self, resource: &K) -> Result<K, StoreError>;
}

/// Attaches `parent`'s controller owner reference to `child`, enabling
/// cascading deletion by the garbage collector.
pub fn set_owner<K: Resource>(child: &mut K, parent: &Nginx) -> Result<(), ControllerError> {
    let owner_ref = parent
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::OwnerReference {
            kind: "Nginx",
            name: parent.name_any(),
            reason: "owner has no uid".to_string(),
        })?;

    let refs = child.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.uid == owner_ref.uid) {
        refs.push(owner_ref);
    }
    Ok(())
}

/// API-server backed store for Nginx objects and managed resources.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key<K: Resource>(resource: &K) -> Result<(String, String), StoreError> {
    let name = resource
        .meta()
        .name
        .clone()
        .ok_or(StoreError::MissingObjectKey(".metadata.name"))?;
    let namespace = resource
        .meta()
        .namespace
        .clone()
        .ok_or(StoreError::MissingObjectKey(".metadata.namespace"))?;
    Ok((namespace, name))
}

#[async_trait]
impl DeclaredStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Nginx, StoreError> {
        self.api::<Nginx>(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, "Nginx", &key.name))
    }

    async fn update_status(&self, nginx: &Nginx, status: &NginxStatus) -> Result<(), StoreError> {
        let (namespace, name) = object_key(nginx)?;
        let patch = serde_json::json!({ "status": status });
        self.api::<Nginx>(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(e, "Nginx", &name))
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &K::kind(&()), name))
    }

    async fn create(&self, resource: &K) -> Result<K, StoreError> {
        let (namespace, name) = object_key(resource)?;
        self.api::<K>(&namespace)
            .create(&PostParams::default(), resource)
            .await
            .map_err(|e| StoreError::from_kube(e, &K::kind(&()), &name))
    }

    async fn update(&self, resource: &K) -> Result<K, StoreError> {
        let (namespace, name) = object_key(resource)?;
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| StoreError::from_kube(e, &K::kind(&()), &name))
    }
}
