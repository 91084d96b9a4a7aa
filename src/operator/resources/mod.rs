//! Kubernetes Resource Creation
//!
//! Pure builders turning spec objects into the child objects they own.

pub mod grafana;
pub mod monitoringstack;
pub mod thanosquerier;

pub use monitoringstack::stack_descriptors;
pub use thanosquerier::{ensure_labels, querier_objects};

use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

use super::types::{OperatorError, Result};

/// Controller owner reference pointing at `owner`.
///
/// The owner must have been read from the store; objects without a uid
/// cannot own anything.
pub(crate) fn owner_reference<K>(owner: &K) -> Result<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidSpec(format!(
            "{} {} has no uid, cannot own children",
            K::kind(&()),
            owner.name_any()
        ))
    })
}

pub(crate) fn metadata(
    name: impl Into<String>,
    namespace: impl Into<String>,
    labels: BTreeMap<String, String>,
    owner: Option<OwnerReference>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(namespace.into()),
        labels: (!labels.is_empty()).then_some(labels),
        owner_references: owner.map(|o| vec![o]),
        ..Default::default()
    }
}

pub(crate) fn service_spec(
    selector: BTreeMap<String, String>,
    port_name: &str,
    port: i32,
    target: IntOrString,
) -> ServiceSpec {
    ServiceSpec {
        selector: Some(selector),
        ports: Some(vec![ServicePort {
            name: Some(port_name.to_string()),
            port,
            target_port: Some(target),
            ..Default::default()
        }]),
        ..Default::default()
    }
}
