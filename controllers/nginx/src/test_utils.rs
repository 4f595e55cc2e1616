//! Test utilities for unit testing reconcilers
//!
//! In-memory stores implementing the store traits, with call counters and
//! fault injection, plus helpers for creating test objects.

use crate::config::{ControllerConfig, WorkloadTemplate};
use crate::reconciler::translate::derive_workload_spec;
use crate::reconciler::Reconciler;
use crate::store::{DeclaredStore, ObjectKey, ResourceStore, StoreError};
use async_trait::async_trait;
use crds::{Nginx, NginxSpec, NginxStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Helper to create a test Nginx with uid and generation set
pub fn create_test_nginx(name: &str, namespace: &str, size: i32) -> Nginx {
    Nginx {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{}", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: NginxSpec { size },
        status: None,
    }
}

/// Helper to create the Deployment the controller would create for `nginx`,
/// with `replicas` live replicas
pub fn create_test_deployment(nginx: &Nginx, replicas: i32) -> Deployment {
    let mut deployment = derive_workload_spec(nginx, &WorkloadTemplate::default());
    deployment.spec.get_or_insert_with(DeploymentSpec::default).replicas = Some(replicas);
    deployment
}

fn fault(slot: &Mutex<Option<String>>) -> Result<(), StoreError> {
    match slot.lock().unwrap().clone() {
        Some(msg) => Err(StoreError::Unavailable(msg)),
        None => Ok(()),
    }
}

/// In-memory Nginx store
#[derive(Clone, Default)]
pub struct MockDeclaredStore {
    objects: Arc<Mutex<HashMap<ObjectKey, Nginx>>>,
    get_fault: Arc<Mutex<Option<String>>>,
    status_fault: Arc<Mutex<Option<String>>>,
    gets: Arc<AtomicUsize>,
    status_writes: Arc<AtomicUsize>,
}

impl MockDeclaredStore {
    /// Add or replace an Nginx (for test setup)
    pub fn insert(&self, nginx: Nginx) {
        self.objects.lock().unwrap().insert(ObjectKey::of(&nginx), nginx);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&ObjectKey::new(namespace, name));
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<Nginx> {
        self.objects.lock().unwrap().get(&ObjectKey::new(namespace, name)).cloned()
    }

    /// Change `spec.size` of a stored Nginx, as a user edit would
    pub fn set_size(&self, namespace: &str, name: &str, size: i32) {
        if let Some(nginx) = self.objects.lock().unwrap().get_mut(&ObjectKey::new(namespace, name)) {
            nginx.spec.size = size;
            nginx.metadata.generation = Some(nginx.metadata.generation.unwrap_or(0) + 1);
        }
    }

    pub fn fail_gets(&self, msg: &str) {
        *self.get_fault.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_status_writes(&self, msg: &str) {
        *self.status_fault.lock().unwrap() = Some(msg.to_string());
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeclaredStore for MockDeclaredStore {
    async fn get(&self, key: &ObjectKey) -> Result<Nginx, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        fault(&self.get_fault)?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Nginx".to_string(),
                name: key.name.clone(),
            })
    }

    async fn update_status(&self, nginx: &Nginx, status: &NginxStatus) -> Result<(), StoreError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        fault(&self.status_fault)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&ObjectKey::of(nginx))
            .ok_or_else(|| StoreError::NotFound {
                kind: "Nginx".to_string(),
                name: nginx.name_any(),
            })?;
        // Status subresource: the stored spec is left as is
        stored.status = Some(status.clone());
        Ok(())
    }
}

/// In-memory store for one managed resource kind
pub struct MockResourceStore<K> {
    objects: Arc<Mutex<HashMap<ObjectKey, K>>>,
    /// Snapshots returned by the next gets instead of the stored object,
    /// simulating a lagging cache
    stale: Arc<Mutex<VecDeque<K>>>,
    get_fault: Arc<Mutex<Option<String>>>,
    create_fault: Arc<Mutex<Option<String>>>,
    update_fault: Arc<Mutex<Option<String>>>,
    /// Answer creates/updates with `Conflict`, as the API server does when
    /// another writer got there first
    create_conflict: Arc<AtomicBool>,
    update_conflict: Arc<AtomicBool>,
    gets: Arc<AtomicUsize>,
    creates: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl<K> Clone for MockResourceStore<K> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            stale: self.stale.clone(),
            get_fault: self.get_fault.clone(),
            create_fault: self.create_fault.clone(),
            update_fault: self.update_fault.clone(),
            create_conflict: self.create_conflict.clone(),
            update_conflict: self.update_conflict.clone(),
            gets: self.gets.clone(),
            creates: self.creates.clone(),
            updates: self.updates.clone(),
        }
    }
}

impl<K> Default for MockResourceStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            stale: Arc::new(Mutex::new(VecDeque::new())),
            get_fault: Arc::new(Mutex::new(None)),
            create_fault: Arc::new(Mutex::new(None)),
            update_fault: Arc::new(Mutex::new(None)),
            create_conflict: Arc::new(AtomicBool::new(false)),
            update_conflict: Arc::new(AtomicBool::new(false)),
            gets: Arc::new(AtomicUsize::new(0)),
            creates: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<K> MockResourceStore<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    /// Add or replace an object (for test setup)
    pub fn insert(&self, obj: K) {
        self.objects.lock().unwrap().insert(ObjectKey::of(&obj), obj);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(&ObjectKey::new(namespace, name)).cloned()
    }

    /// Queue a snapshot to be returned by the next get instead of the stored
    /// object
    pub fn queue_stale(&self, obj: K) {
        self.stale.lock().unwrap().push_back(obj);
    }

    pub fn fail_gets(&self, msg: &str) {
        *self.get_fault.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_creates(&self, msg: &str) {
        *self.create_fault.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_updates(&self, msg: &str) {
        *self.update_fault.lock().unwrap() = Some(msg.to_string());
    }

    /// Make every create fail with `Conflict`, even when nothing is stored
    pub fn conflict_creates(&self) {
        self.create_conflict.store(true, Ordering::SeqCst);
    }

    /// Make every update fail with `Conflict`
    pub fn conflict_updates(&self) {
        self.update_conflict.store(true, Ordering::SeqCst);
    }

    /// Clear all injected faults
    pub fn heal(&self) {
        *self.get_fault.lock().unwrap() = None;
        *self.create_fault.lock().unwrap() = None;
        *self.update_fault.lock().unwrap() = None;
        self.create_conflict.store(false, Ordering::SeqCst);
        self.update_conflict.store(false, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn conflict(name: &str) -> StoreError {
        StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
        }
    }

    fn not_found(name: &str) -> StoreError {
        StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<K> ResourceStore<K> for MockResourceStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        fault(&self.get_fault)?;
        if let Some(snapshot) = self.stale.lock().unwrap().pop_front() {
            return Ok(snapshot);
        }
        self.object(namespace, name).ok_or_else(|| Self::not_found(name))
    }

    async fn create(&self, resource: &K) -> Result<K, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        fault(&self.create_fault)?;
        let key = ObjectKey::of(resource);
        let mut objects = self.objects.lock().unwrap();
        if self.create_conflict.load(Ordering::SeqCst) || objects.contains_key(&key) {
            return Err(Self::conflict(&key.name));
        }
        objects.insert(key, resource.clone());
        Ok(resource.clone())
    }

    async fn update(&self, resource: &K) -> Result<K, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        fault(&self.update_fault)?;
        let key = ObjectKey::of(resource);
        if self.update_conflict.load(Ordering::SeqCst) {
            return Err(Self::conflict(&key.name));
        }
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(Self::not_found(&key.name));
        }
        objects.insert(key, resource.clone());
        Ok(resource.clone())
    }
}

/// The three stores a reconciler needs, sharing state with the reconciler
/// built from them
#[derive(Clone, Default)]
pub struct TestStores {
    pub nginxes: MockDeclaredStore,
    pub deployments: MockResourceStore<Deployment>,
    pub services: MockResourceStore<Service>,
}

impl TestStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciler over these stores with the default configuration
    /// (5s retry interval)
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.nginxes.clone(),
            self.deployments.clone(),
            self.services.clone(),
            &ControllerConfig::default(),
        )
    }

    pub fn deployments_replicas(&self, namespace: &str, name: &str) -> Option<i32> {
        self.deployments
            .object(namespace, name)
            .and_then(|d| d.spec)
            .and_then(|spec| spec.replicas)
    }

    /// Total mutating calls on the managed-resource stores
    pub fn mutations(&self) -> usize {
        self.deployments.creates()
            + self.deployments.updates()
            + self.services.creates()
            + self.services.updates()
    }
}
