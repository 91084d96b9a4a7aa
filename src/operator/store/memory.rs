//! In-memory object store used by unit tests.
//!
//! Mimics the parts of API server behaviour the reconcilers rely on: version
//! stamps checked on update, uid and cluster address allocation on create,
//! immutable service addresses, and no-op updates that do not bump versions.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::NamespaceStatus;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ObjectStore, StoreError};
use crate::operator::object::{Kind, Object, ObjectKey};

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Object>,
    next_version: u64,
    mutations: usize,
    pending_conflicts: usize,
}

impl State {
    fn stamp(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `object` as if another actor had created it.
    pub(crate) fn insert(&self, mut object: Object) {
        let mut state = self.state.lock().unwrap();
        let version = state.stamp();
        object.meta_mut().resource_version = Some(version);
        state.objects.insert(object.key(), object);
    }

    pub(crate) fn object(&self, key: &ObjectKey) -> Option<Object> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub(crate) fn keys(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    /// Number of writes that changed stored state.
    pub(crate) fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Makes the next `count` updates fail with a version conflict.
    pub(crate) fn inject_conflicts(&self, count: usize) {
        self.state.lock().unwrap().pending_conflicts = count;
    }
}

fn service_address(object: &Object) -> Option<String> {
    match object {
        Object::Service(service) => service.spec.as_ref().and_then(|s| s.cluster_ip.clone()),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
        Ok(self.object(key))
    }

    async fn create(&self, object: &Object) -> Result<Object, StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = object.key();
        if key.kind.is_namespaced() && key.namespace.is_none() {
            return Err(StoreError::MissingNamespace(key.kind));
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }

        let mut created = object.clone();
        let version = state.stamp();
        let meta = created.meta_mut();
        meta.resource_version = Some(version.clone());
        meta.uid = Some(format!("uid-{version}"));
        match &mut created {
            Object::Service(service) => {
                let spec = service.spec.get_or_insert_with(Default::default);
                if spec.cluster_ip.is_none() {
                    spec.cluster_ip = Some(format!("10.96.0.{version}"));
                }
            }
            Object::Namespace(namespace) => {
                namespace.status = Some(NamespaceStatus {
                    phase: Some("Active".into()),
                    ..Default::default()
                });
            }
            _ => {}
        }

        state.mutations += 1;
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, object: &Object) -> Result<Object, StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = object.key();
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound(key));
        };
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(StoreError::Conflict(key));
        }
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(StoreError::Conflict(key));
        }
        if service_address(&stored) != service_address(object) {
            return Err(StoreError::Invalid {
                key,
                message: "spec.clusterIP: field is immutable".into(),
            });
        }
        if stored == *object {
            return Ok(stored);
        }

        let mut updated = object.clone();
        updated.meta_mut().resource_version = Some(state.stamp());
        state.mutations += 1;
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn apply(&self, object: &Object, _field_manager: &str) -> Result<Object, StoreError> {
        let existing = self.object(&object.key());
        match existing {
            None => self.create(object).await,
            Some(existing) => {
                let mut merged = object.clone();
                merged
                    .merge_immutable_fields(&existing)
                    .map_err(|e| StoreError::Invalid {
                        key: object.key(),
                        message: e.to_string(),
                    })?;
                self.update(&merged).await
            }
        }
    }

    async fn list(&self, kind: Kind, namespace: Option<String>) -> Result<Vec<Object>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.is_none() || key.namespace == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }
}
