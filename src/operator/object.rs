//! Object model
//!
//! A closed set of tagged variants covering every kind of object the operator
//! reads or writes. Call sites work on [`Object`] and never branch on API
//! groups or kinds themselves.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;

use super::crd::{MonitoringStack, ThanosQuerier};
use super::external::{
    Alertmanager, Grafana, GrafanaDataSource, OperatorGroup, Prometheus, Subscription,
};
use super::types::OperatorError;

/// Invokes `$callback!` with the full kind table: `Variant => Type : scope`.
macro_rules! for_each_kind {
    ($callback:ident) => {
        $callback! {
            MonitoringStack => MonitoringStack : namespaced,
            ThanosQuerier => ThanosQuerier : namespaced,
            Namespace => Namespace : cluster,
            CustomResourceDefinition => CustomResourceDefinition : cluster,
            OperatorGroup => OperatorGroup : namespaced,
            Subscription => Subscription : namespaced,
            Grafana => Grafana : namespaced,
            ServiceAccount => ServiceAccount : namespaced,
            Role => Role : namespaced,
            RoleBinding => RoleBinding : namespaced,
            Secret => Secret : namespaced,
            Prometheus => Prometheus : namespaced,
            Alertmanager => Alertmanager : namespaced,
            Service => Service : namespaced,
            PodDisruptionBudget => PodDisruptionBudget : namespaced,
            GrafanaDataSource => GrafanaDataSource : namespaced,
            Deployment => Deployment : namespaced,
        }
    };
}
pub(crate) use for_each_kind;

macro_rules! scope_is_namespaced {
    (namespaced) => {
        true
    };
    (cluster) => {
        false
    };
}

macro_rules! define_objects {
    ($($variant:ident => $ty:ty : $scope:ident),+ $(,)?) => {
        /// Kind tag of an [`Object`].
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Kind {
            $($variant),+
        }

        impl Kind {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Kind::$variant => stringify!($variant)),+
                }
            }

            pub fn is_namespaced(&self) -> bool {
                match self {
                    $(Kind::$variant => scope_is_namespaced!($scope)),+
                }
            }
        }

        #[derive(Clone, Debug, PartialEq)]
        pub enum Object {
            $($variant($ty)),+
        }

        impl Object {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Object::$variant(_) => Kind::$variant),+
                }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $(Object::$variant(inner) => inner.meta()),+
                }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Object::$variant(inner) => inner.meta_mut()),+
                }
            }
        }

        $(
            impl From<$ty> for Object {
                fn from(inner: $ty) -> Self {
                    Object::$variant(inner)
                }
            }

            impl TryFrom<Object> for $ty {
                type Error = OperatorError;

                fn try_from(object: Object) -> Result<Self, Self::Error> {
                    match object {
                        Object::$variant(inner) => Ok(inner),
                        other => Err(OperatorError::TypeMismatch {
                            expected: Kind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

for_each_kind!(define_objects);

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Object {
    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey {
            kind: self.kind(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.meta().labels.as_ref().unwrap_or(&EMPTY)
    }

    /// Copies fields the store assigns and the operator must not overwrite
    /// from `existing` into `self`.
    ///
    /// The version stamp travels with every kind so updates are checked
    /// against what was read; services additionally keep their allocated
    /// cluster addresses, which are immutable once set.
    pub fn merge_immutable_fields(&mut self, existing: &Object) -> Result<(), OperatorError> {
        if self.kind() != existing.kind() {
            return Err(OperatorError::TypeMismatch {
                expected: self.kind(),
                actual: existing.kind(),
            });
        }

        let observed = existing.meta();
        let meta = self.meta_mut();
        meta.resource_version = observed.resource_version.clone();
        meta.uid = observed.uid.clone();
        meta.creation_timestamp = observed.creation_timestamp.clone();

        if let (Object::Service(desired), Object::Service(observed)) = (self, existing) {
            let observed_spec = observed.spec.as_ref();
            let spec = desired.spec.get_or_insert_with(Default::default);
            spec.cluster_ip = observed_spec.and_then(|s| s.cluster_ip.clone());
            spec.cluster_ips = observed_spec.and_then(|s| s.cluster_ips.clone());
        }
        Ok(())
    }
}

/// Identity of one object in the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.kind, namespace, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}
