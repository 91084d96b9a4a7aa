//! MonitoringStack children
//!
//! Everything a stack needs, in apply order: RBAC for the metrics instance,
//! its self-scrape configuration, the alerting instance with its service and
//! disruption budget, the metrics instance with its services, and the data
//! source registration in the shared Grafana namespace.

use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use maplit::btreemap;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{metadata, owner_reference, service_spec};
use crate::config::InstanceSelector;
use crate::operator::apply::Descriptor;
use crate::operator::crd::MonitoringStack;
use crate::operator::external::{
    AlertingSpec, Alertmanager, AlertmanagerEndpoints, AlertmanagerSpec, EmbeddedObjectMetadata,
    EmbeddedPersistentVolumeClaim, GrafanaDataSource, GrafanaDataSourceFields,
    GrafanaDataSourceSpec, Prometheus, PrometheusSpec, SecretKeySelector, StorageSpec, ThanosSpec,
};
use crate::operator::relationship::sidecar_service_name;
use crate::operator::types::{
    OperatorError, Result, DATASOURCE_OWNER_NAME, DATASOURCE_OWNER_NAMESPACE, LABEL_COMPONENT,
    LABEL_NAME, LABEL_PART_OF,
};

/// Key of the self-scrape job list inside the additional scrape config secret.
pub const SELF_SCRAPE_KEY: &str = "self-scrape-config";

const PROMETHEUS_PORT: i32 = 9090;
const ALERTMANAGER_PORT: i32 = 9093;
const THANOS_GRPC_PORT: i32 = 10901;
const ALERTMANAGER_REPLICAS: i32 = 2;

fn object_labels(name: &str, stack: &str, selector: &InstanceSelector) -> BTreeMap<String, String> {
    let mut labels = component_labels(name, stack);
    labels.extend(selector.labels());
    labels
}

fn component_labels(name: &str, stack: &str) -> BTreeMap<String, String> {
    btreemap! {
        LABEL_NAME.to_string() => name.to_string(),
        LABEL_PART_OF.to_string() => stack.to_string(),
    }
}

fn pod_labels(component: &str, stack: &str) -> BTreeMap<String, String> {
    btreemap! {
        LABEL_COMPONENT.to_string() => component.to_string(),
        LABEL_PART_OF.to_string() => stack.to_string(),
    }
}

/// Name of the GrafanaDataSource registered for a stack.
pub fn datasource_name(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

/// Computes every child of `ms`, in apply order.
///
/// Deterministic: the same stack and selector always yield identical
/// descriptors.
pub fn stack_descriptors(
    ms: &MonitoringStack,
    selector: &InstanceSelector,
    datasource_namespace: &str,
) -> Result<Vec<Descriptor>> {
    let name = ms.name_any();
    let namespace = ms
        .namespace()
        .ok_or_else(|| OperatorError::InvalidSpec("namespace required".to_string()))?;
    let owner = owner_reference(ms)?;

    let prometheus_name = format!("{name}-prometheus");
    let alertmanager_name = format!("{name}-alertmanager");
    let scrape_secret_name = format!("{name}-prometheus-additional-scrape-configs");

    let child = |child_name: &str, labels: BTreeMap<String, String>| {
        metadata(child_name, namespace.as_str(), labels, Some(owner.clone()))
    };

    let prometheus_account = ServiceAccount {
        metadata: child(&prometheus_name, component_labels(&prometheus_name, &name)),
        ..Default::default()
    };

    let read_verbs = vec!["get".to_string(), "list".to_string(), "watch".to_string()];
    let role = Role {
        metadata: child(&prometheus_name, component_labels(&prometheus_name, &name)),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec![
                    "services".to_string(),
                    "endpoints".to_string(),
                    "pods".to_string(),
                ]),
                verbs: read_verbs.clone(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![
                    "extensions".to_string(),
                    "networking.k8s.io".to_string(),
                ]),
                resources: Some(vec!["ingresses".to_string()]),
                verbs: read_verbs,
                ..Default::default()
            },
        ]),
    };

    let role_binding = RoleBinding {
        metadata: child(&prometheus_name, component_labels(&prometheus_name, &name)),
        subjects: Some(vec![Subject {
            api_group: Some(String::new()),
            kind: "ServiceAccount".to_string(),
            name: prometheus_name.clone(),
            namespace: Some(namespace.clone()),
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: prometheus_name.clone(),
        },
    };

    let scrape_secret = Secret {
        metadata: child(&scrape_secret_name, component_labels(&scrape_secret_name, &name)),
        data: Some(btreemap! {
            SELF_SCRAPE_KEY.to_string() => ByteString(self_scrape_config(&name, &namespace)?.into_bytes()),
        }),
        ..Default::default()
    };

    let alertmanager_account = ServiceAccount {
        metadata: child(&alertmanager_name, component_labels(&alertmanager_name, &name)),
        ..Default::default()
    };

    let alertmanager = Alertmanager {
        metadata: child(&name, object_labels(&name, &name, selector)),
        spec: AlertmanagerSpec {
            pod_metadata: Some(EmbeddedObjectMetadata {
                labels: pod_labels("alertmanager", &name),
            }),
            replicas: Some(ALERTMANAGER_REPLICAS),
            log_level: Some(ms.spec.log_level.as_str().to_string()),
            service_account_name: Some(alertmanager_name.clone()),
        },
    };

    let alertmanager_service = Service {
        metadata: child(
            &alertmanager_name,
            object_labels(&alertmanager_name, &name, selector),
        ),
        spec: Some(service_spec(
            pod_labels("alertmanager", &name),
            "web",
            ALERTMANAGER_PORT,
            IntOrString::Int(ALERTMANAGER_PORT),
        )),
        ..Default::default()
    };

    let alertmanager_pdb = PodDisruptionBudget {
        metadata: child(
            &alertmanager_name,
            object_labels(&alertmanager_name, &name, selector),
        ),
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(1)),
            selector: Some(LabelSelector {
                match_labels: Some(pod_labels("alertmanager", &name)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let prometheus = Prometheus {
        metadata: child(&name, object_labels(&name, &name, selector)),
        spec: prometheus_spec(ms, &name, &namespace, &prometheus_name, &scrape_secret_name),
    };

    let prometheus_service = Service {
        metadata: child(
            &prometheus_name,
            object_labels(&prometheus_name, &name, selector),
        ),
        spec: Some(service_spec(
            pod_labels("prometheus", &name),
            "web",
            PROMETHEUS_PORT,
            IntOrString::Int(PROMETHEUS_PORT),
        )),
        ..Default::default()
    };

    let sidecar_name = sidecar_service_name(&name);
    let mut sidecar_spec = service_spec(
        pod_labels("prometheus", &name),
        "grpc",
        THANOS_GRPC_PORT,
        IntOrString::String("grpc".to_string()),
    );
    sidecar_spec.cluster_ip = Some("None".to_string());
    let sidecar_service = Service {
        metadata: child(&sidecar_name, object_labels(&sidecar_name, &name, selector)),
        spec: Some(sidecar_spec),
        ..Default::default()
    };

    Ok(vec![
        Descriptor::new(prometheus_account),
        Descriptor::new(role),
        Descriptor::new(role_binding),
        Descriptor::new(scrape_secret),
        Descriptor::new(alertmanager_account),
        Descriptor::new(alertmanager),
        Descriptor::new(alertmanager_service),
        Descriptor::new(alertmanager_pdb),
        Descriptor::new(prometheus),
        Descriptor::new(prometheus_service),
        Descriptor::new(sidecar_service),
        Descriptor::new(grafana_datasource(&name, &namespace, datasource_namespace)),
    ])
}

fn prometheus_spec(
    ms: &MonitoringStack,
    name: &str,
    namespace: &str,
    service_account: &str,
    scrape_secret: &str,
) -> PrometheusSpec {
    // absent selector selects everything
    let selector = ms.spec.resource_selector.clone().unwrap_or_default();
    let config = ms.spec.prometheus_config.clone().unwrap_or_default();

    PrometheusSpec {
        pod_metadata: Some(EmbeddedObjectMetadata {
            labels: pod_labels("prometheus", name),
        }),
        log_level: Some(ms.spec.log_level.as_str().to_string()),
        retention: Some(ms.spec.retention.clone()),
        resources: Some(ms.spec.resources.clone()),
        service_account_name: Some(service_account.to_string()),
        service_monitor_selector: Some(selector.clone()),
        pod_monitor_selector: Some(selector.clone()),
        rule_selector: Some(selector),
        alerting: Some(AlertingSpec {
            alertmanagers: vec![AlertmanagerEndpoints {
                api_version: "v2".to_string(),
                name: format!("{name}-alertmanager"),
                namespace: namespace.to_string(),
                scheme: "http".to_string(),
                port: IntOrString::String("web".to_string()),
            }],
        }),
        additional_scrape_configs: Some(SecretKeySelector {
            name: scrape_secret.to_string(),
            key: SELF_SCRAPE_KEY.to_string(),
        }),
        remote_write: config.remote_write,
        storage: config
            .persistent_volume_claim
            .map(|spec| StorageSpec {
                volume_claim_template: EmbeddedPersistentVolumeClaim { spec },
            }),
        thanos: Some(ThanosSpec::default()),
    }
}

fn grafana_datasource(name: &str, namespace: &str, datasource_namespace: &str) -> GrafanaDataSource {
    let datasource = datasource_name(namespace, name);
    GrafanaDataSource {
        metadata: ObjectMeta {
            name: Some(datasource.clone()),
            namespace: Some(datasource_namespace.to_string()),
            annotations: Some(btreemap! {
                DATASOURCE_OWNER_NAME.to_string() => name.to_string(),
                DATASOURCE_OWNER_NAMESPACE.to_string() => namespace.to_string(),
            }),
            ..Default::default()
        },
        spec: GrafanaDataSourceSpec {
            name: datasource.clone(),
            datasources: vec![GrafanaDataSourceFields {
                name: datasource,
                type_: "prometheus".to_string(),
                access: "proxy".to_string(),
                url: format!("http://{name}-prometheus.{namespace}:{PROMETHEUS_PORT}"),
                version: 1,
            }],
        },
    }
}

// ==================== Self-scrape configuration ====================

#[derive(Serialize)]
struct ScrapeJob {
    job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    honor_labels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    honor_timestamps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scrape_interval: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scrape_timeout: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_path: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<&'static str>,
    relabel_configs: Vec<Relabel>,
    kubernetes_sd_configs: Vec<KubernetesDiscovery>,
}

#[derive(Serialize, Default)]
struct Relabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source_labels: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replacement: Option<&'static str>,
}

#[derive(Serialize)]
struct KubernetesDiscovery {
    role: &'static str,
    namespaces: DiscoveryNamespaces,
}

#[derive(Serialize)]
struct DiscoveryNamespaces {
    names: Vec<String>,
}

fn keep(source: &'static str, regex: impl Into<String>) -> Relabel {
    Relabel {
        action: Some("keep"),
        source_labels: vec![source],
        regex: Some(regex.into()),
        ..Default::default()
    }
}

fn copy(source: &'static str, target: &'static str) -> Relabel {
    Relabel {
        source_labels: vec![source],
        target_label: Some(target),
        ..Default::default()
    }
}

/// Relabelling shared by both jobs: keep the `web` port of the named
/// service and attach the usual target labels.
fn self_relabel(service: String) -> Vec<Relabel> {
    vec![
        keep("__meta_kubernetes_service_label_app_kubernetes_io_name", service),
        keep("__meta_kubernetes_endpoint_port_name", "web"),
        copy("__meta_kubernetes_namespace", "namespace"),
        copy("__meta_kubernetes_service_name", "service"),
        copy("__meta_kubernetes_pod_name", "pod"),
        copy("__meta_kubernetes_pod_container_name", "container"),
        Relabel {
            target_label: Some("endpoint"),
            replacement: Some("web"),
            ..Default::default()
        },
    ]
}

/// Scrape jobs for the stack's own metrics and alerting instances, limited
/// to the stack's namespace.
fn self_scrape_config(name: &str, namespace: &str) -> Result<String> {
    let discovery = || {
        vec![KubernetesDiscovery {
            role: "endpoints",
            namespaces: DiscoveryNamespaces {
                names: vec![namespace.to_string()],
            },
        }]
    };
    let jobs = vec![
        ScrapeJob {
            job_name: "prometheus-self".to_string(),
            honor_labels: Some(true),
            honor_timestamps: None,
            scrape_interval: None,
            scrape_timeout: None,
            metrics_path: None,
            scheme: None,
            relabel_configs: self_relabel(format!("{name}-prometheus")),
            kubernetes_sd_configs: discovery(),
        },
        ScrapeJob {
            job_name: "alertmanager-self".to_string(),
            honor_labels: None,
            honor_timestamps: Some(true),
            scrape_interval: Some("30s"),
            scrape_timeout: Some("10s"),
            metrics_path: Some("/metrics"),
            scheme: Some("http"),
            relabel_configs: self_relabel(format!("{name}-alertmanager")),
            kubernetes_sd_configs: discovery(),
        },
    ];
    Ok(serde_yaml_ng::to_string(&jobs)?)
}
