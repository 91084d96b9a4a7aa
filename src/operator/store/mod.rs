//! Object store contract
//!
//! The reconciliation core only talks to the cluster through [`ObjectStore`].
//! [`KubeStore`] implements it on top of the Kubernetes API; tests use an
//! in-memory store or mocks.

mod kube_store;
#[cfg(test)]
pub(crate) mod memory;

pub use self::kube_store::KubeStore;

use super::object::{Kind, Object, ObjectKey};
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by the object store, already classified into the
/// outcomes the reconciler cares about.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("version conflict on {0}")]
    Conflict(ObjectKey),

    #[error("{0} is namespaced but no namespace was given")]
    MissingNamespace(Kind),

    #[error("{key} rejected: {message}")]
    Invalid { key: ObjectKey, message: String },

    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Read and write access to the system of record.
///
/// Watches are not part of the trait; event sources consume the API watch
/// streams directly and only ever produce reconcile requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads one object. A missing object is `Ok(None)`, never an error.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError>;

    /// Creates `object`, failing with [`StoreError::AlreadyExists`] if its
    /// identity is taken.
    async fn create(&self, object: &Object) -> Result<Object, StoreError>;

    /// Replaces `object`; its version stamp must match the stored one or the
    /// call fails with [`StoreError::Conflict`].
    async fn update(&self, object: &Object) -> Result<Object, StoreError>;

    /// Server-side apply with forced field ownership.
    async fn apply(&self, object: &Object, field_manager: &str) -> Result<Object, StoreError>;

    /// Lists every object of `kind`, in one namespace or across all of them.
    async fn list(&self, kind: Kind, namespace: Option<String>) -> Result<Vec<Object>, StoreError>;
}
