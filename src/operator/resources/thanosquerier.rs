//! ThanosQuerier components

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServiceAccount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use maplit::btreemap;
use std::collections::BTreeMap;

use super::{metadata, service_spec};
use crate::operator::crd::ThanosQuerier;
use crate::operator::object::Object;
use crate::operator::types::{
    OperatorError, Result, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_PART_OF, MANAGED_BY_VALUE,
};

pub const THANOS_IMAGE: &str = "quay.io/thanos/thanos:v0.24.0";
const HTTP_PORT: i32 = 9090;
const PART_OF_VALUE: &str = "ThanosQuerier";

pub fn component_name(querier: &str) -> String {
    format!("thanos-querier-{querier}")
}

/// Labels every querier component carries.
pub fn component_labels(querier: &str) -> BTreeMap<String, String> {
    btreemap! {
        LABEL_INSTANCE.to_string() => querier.to_string(),
        LABEL_PART_OF.to_string() => PART_OF_VALUE.to_string(),
        LABEL_MANAGED_BY.to_string() => MANAGED_BY_VALUE.to_string(),
    }
}

fn pod_labels(querier: &str) -> BTreeMap<String, String> {
    btreemap! {
        LABEL_INSTANCE.to_string() => querier.to_string(),
        LABEL_PART_OF.to_string() => PART_OF_VALUE.to_string(),
    }
}

/// Adds each of `wanted` to the object's labels unless the key is already set.
pub fn ensure_labels(object: &mut Object, wanted: &BTreeMap<String, String>) {
    let labels = object.meta_mut().labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in wanted {
        labels.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn query_args(querier: &ThanosQuerier, endpoints: &[String]) -> Vec<String> {
    let mut args = vec![
        "query".to_string(),
        format!("--http-address=0.0.0.0:{HTTP_PORT}"),
        "--log.format=logfmt".to_string(),
    ];
    args.extend(endpoints.iter().map(|url| format!("--endpoint={url}")));
    args.extend(
        querier
            .spec
            .replica_labels
            .iter()
            .map(|label| format!("--query.replica-label={label}")),
    );
    args
}

/// Service account, deployment and service for `querier`, querying the
/// given sidecar endpoints.
///
/// Labels and owner references are left to the caller.
pub fn querier_objects(querier: &ThanosQuerier, endpoints: &[String]) -> Result<Vec<Object>> {
    let name = querier.name_any();
    let namespace = querier
        .namespace()
        .ok_or_else(|| OperatorError::InvalidSpec("namespace required".to_string()))?;
    let component = component_name(&name);
    let meta = || metadata(component.as_str(), namespace.as_str(), BTreeMap::new(), None);

    let account = ServiceAccount {
        metadata: meta(),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: meta(),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(pod_labels(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(&name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(component.clone()),
                    containers: vec![Container {
                        name: "thanos-querier".to_string(),
                        image: Some(THANOS_IMAGE.to_string()),
                        args: Some(query_args(querier, endpoints)),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: HTTP_PORT,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let service = Service {
        metadata: meta(),
        spec: Some(service_spec(
            pod_labels(&name),
            "http",
            HTTP_PORT,
            IntOrString::String("http".to_string()),
        )),
        ..Default::default()
    };

    Ok(vec![account.into(), deployment.into(), service.into()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::crd::ThanosQuerierSpec;
    use crate::operator::object::Kind;

    fn querier(replica_labels: Vec<String>) -> ThanosQuerier {
        let mut tq = ThanosQuerier::new(
            "q",
            ThanosQuerierSpec {
                replica_labels,
                ..Default::default()
            },
        );
        tq.metadata.namespace = Some("ns".into());
        tq
    }

    #[test]
    fn deployment_queries_every_endpoint() {
        let endpoints = vec![
            "dnssrv+_grpc._tcp.a-thanos-sidecar.ns.svc.cluster.local".to_string(),
            "dnssrv+_grpc._tcp.b-thanos-sidecar.ns.svc.cluster.local".to_string(),
        ];
        let objects = querier_objects(&querier(vec!["replica".into()]), &endpoints).unwrap();
        let kinds: Vec<Kind> = objects.iter().map(Object::kind).collect();
        assert_eq!(kinds, vec![Kind::ServiceAccount, Kind::Deployment, Kind::Service]);

        let Object::Deployment(deployment) = &objects[1] else {
            panic!("expected deployment");
        };
        assert_eq!(deployment.metadata.name.as_deref(), Some("thanos-querier-q"));
        let container = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        let args = container.args.as_ref().unwrap();
        assert_eq!(args[0], "query");
        assert!(args.contains(&format!("--endpoint={}", endpoints[0])));
        assert!(args.contains(&format!("--endpoint={}", endpoints[1])));
        assert!(args.contains(&"--query.replica-label=replica".to_string()));
    }

    #[test]
    fn no_endpoints_still_builds_components() {
        let objects = querier_objects(&querier(vec![]), &[]).unwrap();
        let Object::Deployment(deployment) = &objects[1] else {
            panic!("expected deployment");
        };
        let container = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        assert!(!container
            .args
            .as_ref()
            .unwrap()
            .iter()
            .any(|a| a.starts_with("--endpoint")));
    }

    #[test]
    fn ensure_labels_keeps_existing_values() {
        let mut objects = querier_objects(&querier(vec![]), &[]).unwrap();
        let service = &mut objects[2];
        service.meta_mut().labels = Some(btreemap! {
            LABEL_INSTANCE.to_string() => "custom".to_string(),
        });

        ensure_labels(service, &component_labels("q"));

        let labels = service.labels();
        assert_eq!(labels[LABEL_INSTANCE], "custom");
        assert_eq!(labels[LABEL_PART_OF], "ThanosQuerier");
        assert_eq!(labels[LABEL_MANAGED_BY], "observability-operator");
    }

    #[test]
    fn ensure_labels_on_unlabelled_object() {
        let mut objects = querier_objects(&querier(vec![]), &[]).unwrap();
        ensure_labels(&mut objects[0], &component_labels("q"));
        assert_eq!(objects[0].labels(), &component_labels("q"));
    }
}
