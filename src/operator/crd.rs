use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::external::RemoteWriteSpec;

// ==================== MonitoringStack CRD ====================

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "monitoring.rhobs",
    version = "v1alpha1",
    kind = "MonitoringStack",
    plural = "monitoringstacks",
    shortname = "ms",
    status = "MonitoringStackStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStackSpec {
    /// Log level of the metrics and alerting instances
    #[serde(default)]
    pub log_level: LogLevel,

    /// How long to keep samples
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Selects service monitors, pod monitors and rules. Absent selects everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<LabelSelector>,

    /// Resource requirements of the metrics instance
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Extra metrics instance configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus_config: Option<PrometheusConfig>,
}

fn default_retention() -> String {
    "120h".to_string()
}

impl Default for MonitoringStackSpec {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            retention: default_retention(),
            resource_selector: None,
            resources: ResourceRequirements::default(),
            prometheus_config: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusConfig {
    /// Remote write endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_write: Vec<RemoteWriteSpec>,

    /// Persistent storage for the metrics instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStackStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ==================== ThanosQuerier CRD ====================

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "monitoring.rhobs",
    version = "v1alpha1",
    kind = "ThanosQuerier",
    plural = "thanosqueriers",
    shortname = "tq",
    status = "ThanosQuerierStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ThanosQuerierSpec {
    /// Selects the MonitoringStacks whose sidecars are queried
    pub selector: LabelSelector,

    /// Namespaces in which matching stacks are considered
    #[serde(default)]
    pub namespace_selector: NamespaceSelector,

    /// Labels treated as replica labels for deduplication
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replica_labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Match every namespace
    #[serde(default)]
    pub any: bool,

    /// Explicit list of namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThanosQuerierStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ThanosQuerier {
    /// Whether a stack living in `namespace` is in scope for this querier.
    ///
    /// `any` wins; an explicit list restricts to those names; an empty
    /// selector only admits the querier's own namespace.
    pub fn matches_namespace(&self, namespace: &str) -> bool {
        let selector = &self.spec.namespace_selector;
        if selector.any {
            return true;
        }
        if selector.match_names.is_empty() {
            return self.metadata.namespace.as_deref() == Some(namespace);
        }
        selector.match_names.iter().any(|name| name == namespace)
    }
}

/// Definitions of both resource kinds as a multi-document YAML stream.
pub fn crd_manifests() -> Result<String, serde_yaml_ng::Error> {
    Ok(format!(
        "{}---\n{}",
        serde_yaml_ng::to_string(&MonitoringStack::crd())?,
        serde_yaml_ng::to_string(&ThanosQuerier::crd())?
    ))
}
