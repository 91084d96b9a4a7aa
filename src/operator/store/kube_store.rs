//! Kubernetes-backed object store

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::trace;

use super::{ObjectStore, StoreError};
use crate::operator::crd::{MonitoringStack, ThanosQuerier};
use crate::operator::external::{
    Alertmanager, Grafana, GrafanaDataSource, OperatorGroup, Prometheus, Subscription,
};
use crate::operator::object::{for_each_kind, Kind, Object, ObjectKey};

/// [`ObjectStore`] over a live cluster connection.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Maps API status codes onto the store contract.
fn classify(key: &ObjectKey, error: kube::Error) -> StoreError {
    match &error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(key.clone()),
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(key.clone())
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(key.clone()),
        kube::Error::Api(response) if response.code == 422 => StoreError::Invalid {
            key: key.clone(),
            message: response.message.clone(),
        },
        _ => StoreError::Api(error),
    }
}

macro_rules! scoped_api {
    (namespaced, $client:expr, $namespace:expr, $kind:expr) => {
        match $namespace {
            Some(namespace) => Api::namespaced($client, namespace),
            None => return Err(StoreError::MissingNamespace($kind)),
        }
    };
    (cluster, $client:expr, $namespace:expr, $kind:expr) => {
        Api::all($client)
    };
}

macro_rules! listing_api {
    (namespaced, $client:expr, $namespace:expr) => {
        match $namespace {
            Some(namespace) => Api::namespaced($client, namespace),
            None => Api::all($client),
        }
    };
    (cluster, $client:expr, $namespace:expr) => {
        Api::all($client)
    };
}

macro_rules! define_kube_dispatch {
    ($($variant:ident => $ty:ty : $scope:ident),+ $(,)?) => {
        impl KubeStore {
            async fn get_object(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
                let namespace = key.namespace.as_deref();
                match key.kind {
                    $(Kind::$variant => {
                        let api: Api<$ty> =
                            scoped_api!($scope, self.client.clone(), namespace, key.kind);
                        api.get_opt(&key.name)
                            .await
                            .map(|found| found.map(Object::$variant))
                            .map_err(|e| classify(key, e))
                    })+
                }
            }

            async fn create_object(&self, object: &Object) -> Result<Object, StoreError> {
                let key = object.key();
                let namespace = key.namespace.as_deref();
                match object {
                    $(Object::$variant(inner) => {
                        let api: Api<$ty> =
                            scoped_api!($scope, self.client.clone(), namespace, key.kind);
                        api.create(&PostParams::default(), inner)
                            .await
                            .map(Object::$variant)
                            .map_err(|e| classify(&key, e))
                    })+
                }
            }

            async fn replace_object(&self, object: &Object) -> Result<Object, StoreError> {
                let key = object.key();
                let namespace = key.namespace.as_deref();
                match object {
                    $(Object::$variant(inner) => {
                        let api: Api<$ty> =
                            scoped_api!($scope, self.client.clone(), namespace, key.kind);
                        api.replace(&key.name, &PostParams::default(), inner)
                            .await
                            .map(Object::$variant)
                            .map_err(|e| classify(&key, e))
                    })+
                }
            }

            async fn apply_object(
                &self,
                object: &Object,
                field_manager: &str,
            ) -> Result<Object, StoreError> {
                let key = object.key();
                let namespace = key.namespace.as_deref();
                let params = PatchParams::apply(field_manager).force();
                match object {
                    $(Object::$variant(inner) => {
                        let api: Api<$ty> =
                            scoped_api!($scope, self.client.clone(), namespace, key.kind);
                        api.patch(&key.name, &params, &Patch::Apply(inner))
                            .await
                            .map(Object::$variant)
                            .map_err(|e| classify(&key, e))
                    })+
                }
            }

            async fn list_objects(
                &self,
                kind: Kind,
                namespace: Option<&str>,
            ) -> Result<Vec<Object>, StoreError> {
                match kind {
                    $(Kind::$variant => {
                        let api: Api<$ty> = listing_api!($scope, self.client.clone(), namespace);
                        let list = api.list(&ListParams::default()).await.map_err(StoreError::Api)?;
                        Ok(list.items.into_iter().map(Object::$variant).collect())
                    })+
                }
            }
        }
    };
}

for_each_kind!(define_kube_dispatch);

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
        trace!(%key, "get");
        self.get_object(key).await
    }

    async fn create(&self, object: &Object) -> Result<Object, StoreError> {
        trace!(key = %object.key(), "create");
        self.create_object(object).await
    }

    async fn update(&self, object: &Object) -> Result<Object, StoreError> {
        trace!(key = %object.key(), "update");
        self.replace_object(object).await
    }

    async fn apply(&self, object: &Object, field_manager: &str) -> Result<Object, StoreError> {
        trace!(key = %object.key(), field_manager, "server-side apply");
        self.apply_object(object, field_manager).await
    }

    async fn list(&self, kind: Kind, namespace: Option<String>) -> Result<Vec<Object>, StoreError> {
        trace!(%kind, ?namespace, "list");
        self.list_objects(kind, namespace.as_deref()).await
    }
}
